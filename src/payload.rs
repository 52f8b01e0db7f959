use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::codec::SyncPayload;
use crate::device_directory::*;
use crate::errors::*;
use crate::ledger::*;
use crate::models::*;
use crate::sync_config::*;
use crate::types::*;
use crate::utilities::*;

/// A record attribute before it is formatted for the wire.
#[derive(Clone, Debug, PartialEq)]
enum SourceValue {
    Missing,
    Integer(i32),
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
}

/// Builds the field map for `operation` on `record`, in configured order.
pub fn build_payload<S: LedgerStore + ?Sized>(
    config: &SyncConfig,
    store: &S,
    record: &TransactionRecord,
    operation: SyncOperation,
) -> Result<SyncPayload> {
    ensure!(
        operation.resource == record.resource(),
        ErrorKind::SyncMisconfigured(format!(
            "{} cannot describe {} {}",
            operation,
            record.resource(),
            record.key
        ))
    );
    let spec = config.operation(operation)?;
    let directory = DeviceDirectory::new(store);
    let mut payload = SyncPayload::new();
    for field in &spec.fields {
        let value = resolve_field(field, record, operation, &directory)?;
        payload.insert(field.name.clone(), value);
    }
    debug!("Built {} payload with {} fields", operation, payload.len());
    Ok(payload)
}

fn resolve_field<S: LedgerStore + ?Sized>(
    field: &FieldSpec,
    record: &TransactionRecord,
    operation: SyncOperation,
    directory: &DeviceDirectory<S>,
) -> Result<Value> {
    match &field.kind {
        FieldKind::Constant { value } => Ok(value.clone()),
        FieldKind::OperationName => Ok(Value::from(operation.name())),
        FieldKind::PrimaryDeviceId => Ok(Value::from(directory.primary_device()?.device_id)),
        FieldKind::KeySingular => Ok(Value::from(record.key)),
        FieldKind::KeyArray => Ok(Value::Array(vec![Value::from(record.key)])),
        FieldKind::FieldReference {
            source,
            format,
            default,
        } => {
            let value = source_value(*source, record, directory)?;
            let value = match format {
                Some(format) => format_value(value, *format, &field.name)?,
                None => plain_value(value),
            };
            match default {
                Some(default) if is_blank(&value) => Ok(default.clone()),
                _ => Ok(value),
            }
        }
        FieldKind::EntityDeviceKey { entity, source } => {
            let name = entity_name(*source, record, directory, &field.name)?;
            Ok(Value::from(directory.resolve(*entity, &name)?.device_key))
        }
        FieldKind::EntityDeviceId { entity, source } => {
            let name = entity_name(*source, record, directory, &field.name)?;
            Ok(Value::from(directory.resolve(*entity, &name)?.device_id))
        }
    }
}

fn source_value<S: LedgerStore + ?Sized>(
    source: FieldSource,
    record: &TransactionRecord,
    directory: &DeviceDirectory<S>,
) -> Result<SourceValue> {
    let value = match (source, &record.details) {
        (FieldSource::Key, _) => SourceValue::Integer(record.key),
        (FieldSource::Date, _) => SourceValue::Date(record.date),
        (FieldSource::Amount, _) => SourceValue::Decimal(record.amount),
        (FieldSource::Notes, _) => match &record.notes {
            Some(notes) => text(notes),
            None => SourceValue::Missing,
        },
        (FieldSource::Currency, _) => match record.currency() {
            Some(currency) => SourceValue::Text(currency.to_string()),
            None => SourceValue::Missing,
        },
        (FieldSource::CurrencyAmount, _) => match record.currency_amount() {
            Some(amount) => SourceValue::Decimal(amount),
            None => SourceValue::Missing,
        },
        (FieldSource::TimeStamp, _) => text(&record.time_stamp),
        (FieldSource::CurrencyAmountOrAmount, _) => {
            SourceValue::Decimal(record.currency_amount().unwrap_or(record.amount))
        }
        (FieldSource::CurrencyOrAccountCurrency, _) => match record.currency() {
            Some(currency) => SourceValue::Text(currency.to_string()),
            None => match directory.resolve(EntityTable::Account, record.account())?.currency {
                Some(currency) => SourceValue::Text(currency),
                None => SourceValue::Missing,
            },
        },
        (FieldSource::Account, RecordDetails::Expense { account, .. })
        | (FieldSource::Account, RecordDetails::Income { account, .. }) => text(account),
        (FieldSource::Category, RecordDetails::Expense { category, .. }) => text(category),
        (FieldSource::Subcategory, RecordDetails::Expense { subcategory, .. }) => {
            text(subcategory)
        }
        (FieldSource::Name, RecordDetails::Income { name, .. }) => text(name),
        (FieldSource::FromAccount, RecordDetails::Transfer { from_account, .. }) => {
            text(from_account)
        }
        (FieldSource::ToAccount, RecordDetails::Transfer { to_account, .. }) => text(to_account),
        (source, _) => bail!(ErrorKind::SyncMisconfigured(format!(
            "source {:?} does not apply to {} records",
            source,
            record.resource()
        ))),
    };
    Ok(value)
}

fn text(value: &str) -> SourceValue {
    SourceValue::Text(value.to_string())
}

fn entity_name<S: LedgerStore + ?Sized>(
    source: FieldSource,
    record: &TransactionRecord,
    directory: &DeviceDirectory<S>,
    field_name: &str,
) -> Result<String> {
    match source_value(source, record, directory)? {
        SourceValue::Text(name) => Ok(name),
        other => bail!(ErrorKind::SyncMisconfigured(format!(
            "{} needs an entity name, but its source gives {:?}",
            field_name, other
        ))),
    }
}

fn plain_value(value: SourceValue) -> Value {
    match value {
        SourceValue::Missing => Value::Null,
        SourceValue::Integer(number) => Value::from(number),
        SourceValue::Text(text) => Value::from(text),
        SourceValue::Decimal(number) => Value::from(number.to_string()),
        SourceValue::Date(date) => Value::from(format_iso_date(date)),
    }
}

fn format_value(value: SourceValue, format: ValueFormat, field_name: &str) -> Result<Value> {
    let formatted = match (format, value) {
        (_, SourceValue::Missing) => Value::Null,
        (ValueFormat::String, value) => match plain_value(value) {
            Value::Number(number) => Value::from(number.to_string()),
            other => other,
        },
        (ValueFormat::Float, SourceValue::Decimal(number)) => Value::from(decimal_to_f64(number)),
        (ValueFormat::Float, SourceValue::Integer(number)) => Value::from(f64::from(number)),
        (ValueFormat::IsoFormat, SourceValue::Date(date)) => Value::from(format_iso_date(date)),
        (format, value) => bail!(ErrorKind::SyncMisconfigured(format!(
            "{} cannot format {:?} as {:?}",
            field_name, value, format
        ))),
    };
    Ok(formatted)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;
    use serde_json::json;

    fn stored_expense(store: &crate::database::Database) -> TransactionRecord {
        store.insert(&expense_draft("25.50")).unwrap()
    }

    fn operation(action: Action, resource: Resource) -> SyncOperation {
        SyncOperation::new(action, resource)
    }

    #[test]
    fn test_add_expense_payload() {
        let store = ledger();
        let record = stored_expense(&store);
        let payload = build_payload(
            &sync_config(),
            &store,
            &record,
            operation(Action::Add, Resource::Expense),
        )
        .unwrap();
        let keys: Vec<&str> = payload.keys().map(|key| key.as_str()).collect();
        assert_eq!(
            &keys[..5],
            &[
                "Operation",
                "expenseDeviceKeys",
                "deviceId",
                "timeStamp",
                "expenseDateString"
            ]
        );
        assert_eq!(payload["Operation"], json!("AddExpense"));
        assert_eq!(payload["expenseDeviceKeys"], json!([record.key]));
        assert_eq!(payload["deviceId"], json!(PRIMARY_DEVICE_ID));
        assert_eq!(payload["timeStamp"], json!(record.time_stamp));
        assert_eq!(payload["expenseDateString"], json!("2025-02-03"));
        assert_eq!(payload["accountDeviceKey"], json!(101));
        assert_eq!(payload["categoryDeviceKey"], json!(201));
        assert_eq!(payload["subcategoryDeviceKey"], json!(301));
        assert_eq!(payload["amount"], json!(25.5));
        assert_eq!(payload["currency"], json!("SGD"));
        assert_eq!(payload["currencyAmount"], json!("25.50"));
        assert_eq!(payload["notesString"], json!("Weekly shop"));
    }

    #[test]
    fn test_update_and_delete_use_singular_key() {
        let store = ledger();
        let record = stored_expense(&store);
        let config = sync_config();
        let update = build_payload(
            &config,
            &store,
            &record,
            operation(Action::Update, Resource::Expense),
        )
        .unwrap();
        assert_eq!(update["expenseDeviceKey"], json!(record.key));
        assert!(!update.contains_key("expenseDeviceKeys"));
        let delete = build_payload(
            &config,
            &store,
            &record,
            operation(Action::Delete, Resource::Expense),
        )
        .unwrap();
        assert_eq!(
            delete.keys().collect::<Vec<_>>(),
            vec!["Operation", "deviceId", "expenseDeviceKey"]
        );
    }

    #[test]
    fn test_notes_default_and_income_name() {
        let store = ledger();
        let record = store.insert(&income_draft("3000")).unwrap();
        let payload = build_payload(
            &sync_config(),
            &store,
            &record,
            operation(Action::Add, Resource::Income),
        )
        .unwrap();
        assert_eq!(payload["notesString"], json!(""));
        assert_eq!(payload["name"], json!("Salary"));
        assert_eq!(payload["accountDeviceId"], json!(TABLET_DEVICE_ID));
    }

    #[test]
    fn test_transfer_payload_uses_both_accounts() {
        let store = ledger();
        let record = store
            .insert(&transfer_draft_between("Cash", "Wallet USD", "100.00"))
            .unwrap();
        let payload = build_payload(
            &sync_config(),
            &store,
            &record,
            operation(Action::Add, Resource::Transfer),
        )
        .unwrap();
        assert_eq!(payload["fromAccountDeviceKey"], json!(101));
        assert_eq!(payload["toAccountDeviceKey"], json!(103));
        assert_eq!(payload["currency"], json!("SGD"));
    }

    #[test]
    fn test_entity_without_device_key_uses_storage_key() {
        let store = ledger();
        let record = store
            .insert(&expense_draft_for("Wallet JPY", "1500"))
            .unwrap();
        let payload = build_payload(
            &sync_config(),
            &store,
            &record,
            operation(Action::Add, Resource::Expense),
        )
        .unwrap();
        assert_eq!(payload["accountDeviceKey"], json!(4));
        assert_eq!(payload["accountDeviceId"], json!(""));
    }

    #[test]
    fn test_inapplicable_source_is_misconfigured() {
        let store = ledger();
        let record = stored_expense(&store);
        let config = SyncConfig::from_json_str(
            r#"{"resources": {"expense": {"AddExpense": {"fields": [
                {"name": "name", "type": "field", "source": "name"}
            ]}}}}"#,
        )
        .unwrap();
        let err = build_payload(
            &config,
            &store,
            &record,
            operation(Action::Add, Resource::Expense),
        )
        .unwrap_err();
        match err.kind() {
            ErrorKind::SyncMisconfigured(_) => {}
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_mismatched_operation_is_rejected() {
        let store = ledger();
        let record = stored_expense(&store);
        assert!(build_payload(
            &sync_config(),
            &store,
            &record,
            operation(Action::Add, Resource::Income),
        )
        .is_err());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(
            format_value(SourceValue::Decimal(decimal("12.30")), ValueFormat::Float, "f").unwrap(),
            json!(12.3)
        );
        assert_eq!(
            format_value(SourceValue::Integer(7), ValueFormat::String, "f").unwrap(),
            json!("7")
        );
        assert_eq!(
            format_value(SourceValue::Missing, ValueFormat::String, "f").unwrap(),
            Value::Null
        );
        assert!(format_value(SourceValue::Text("x".to_string()), ValueFormat::Float, "f").is_err());
    }
}
