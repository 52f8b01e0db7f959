use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::normalizer::MonetaryInput;
use crate::types::*;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForeignAmount {
    pub currency: CurrencyCode,
    pub amount: Decimal,
}

/// Per-kind identifiers, by display name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordDetails {
    Expense {
        account: String,
        category: String,
        subcategory: String,
    },
    Income {
        account: String,
        name: String,
    },
    Transfer {
        from_account: String,
        to_account: String,
    },
}

/// A stored expense, income or transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRecord {
    pub key: i32,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub foreign: Option<ForeignAmount>,
    pub notes: Option<String>,
    pub time_stamp: String,
    pub details: RecordDetails,
}

/// A record that has not been stored yet.  `currency` and `currency_amount`
/// are left unset when the storage defaults should apply.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionDraft {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: Option<CurrencyCode>,
    pub currency_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub details: RecordDetails,
}

/// A new record whose monetary fields still need normalizing.
#[derive(Clone, Debug, PartialEq)]
pub struct AddRequest {
    pub date: NaiveDate,
    pub money: MonetaryInput,
    pub notes: Option<String>,
    pub details: RecordDetails,
}

/// Requested changes to a stored record, before normalizing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateRequest {
    pub money: MonetaryInput,
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangedField {
    Amount,
    Notes,
    Currency,
    CurrencyAmount,
}

/// Explicitly requested changes to an existing record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordChanges {
    pub amount: Option<Decimal>,
    pub notes: Option<String>,
    pub currency: Option<CurrencyCode>,
    pub currency_amount: Option<Decimal>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntityRow {
    pub key: i32,
    pub device_id_key: Option<i32>,
    pub device_key: Option<i32>,
    pub currency: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    pub key: i32,
    pub device_id: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewSyncUpdate {
    pub update_type: String,
    pub uuid: String,
    pub payload: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncUpdateRow {
    pub key: i32,
    pub update_type: String,
    pub uuid: String,
    pub payload: String,
}

/// One entry of a batch request, as read from a batch file.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BatchOperation {
    pub resource: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct BatchResult<T> {
    pub successful: Vec<TransactionRecord>,
    pub failed: Vec<(T, Error)>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchOutcome {
    Empty,
    AllSucceeded,
    PartiallySucceeded,
    AllFailed,
}

impl TransactionRecord {
    pub fn resource(&self) -> Resource {
        self.details.resource()
    }

    /// The account whose currency the record is denominated in.
    pub fn account(&self) -> &str {
        self.details.account()
    }

    pub fn currency(&self) -> Option<CurrencyCode> {
        self.foreign.as_ref().map(|foreign| foreign.currency)
    }

    pub fn currency_amount(&self) -> Option<Decimal> {
        self.foreign.as_ref().map(|foreign| foreign.amount)
    }
}

impl RecordDetails {
    pub fn resource(&self) -> Resource {
        match self {
            RecordDetails::Expense { .. } => Resource::Expense,
            RecordDetails::Income { .. } => Resource::Income,
            RecordDetails::Transfer { .. } => Resource::Transfer,
        }
    }

    pub fn account(&self) -> &str {
        match self {
            RecordDetails::Expense { account, .. } | RecordDetails::Income { account, .. } => {
                account
            }
            RecordDetails::Transfer { from_account, .. } => from_account,
        }
    }
}

impl TransactionDraft {
    pub fn new(
        date: NaiveDate,
        amount: Decimal,
        notes: Option<String>,
        details: RecordDetails,
    ) -> Result<TransactionDraft> {
        let draft = TransactionDraft {
            date,
            amount,
            currency: None,
            currency_amount: None,
            notes,
            details,
        };
        draft.validate()?;
        Ok(draft)
    }

    pub fn with_foreign(
        mut self,
        currency: Option<CurrencyCode>,
        currency_amount: Option<Decimal>,
    ) -> Result<TransactionDraft> {
        self.currency = currency;
        self.currency_amount = currency_amount;
        self.validate()?;
        Ok(self)
    }

    pub fn resource(&self) -> Resource {
        self.details.resource()
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            bail!(monetary_error(&["amount"], "amount must be greater than 0"));
        }
        if let Some(currency_amount) = self.currency_amount {
            if currency_amount <= Decimal::ZERO {
                bail!(monetary_error(
                    &["currency_amount"],
                    "currency_amount must be greater than 0"
                ));
            }
        }
        if self.currency.is_some() && self.currency_amount.is_none() {
            bail!(monetary_error(
                &["currency", "currency_amount"],
                "currency_amount is required when currency is set"
            ));
        }
        let names: Vec<(&str, &str)> = match &self.details {
            RecordDetails::Expense {
                account,
                category,
                subcategory,
            } => vec![
                ("account", account),
                ("category", category),
                ("subcategory", subcategory),
            ],
            RecordDetails::Income { account, name } => vec![("account", account), ("name", name)],
            RecordDetails::Transfer {
                from_account,
                to_account,
            } => {
                if from_account == to_account {
                    bail!(validation_error(
                        "from_account and to_account must be different"
                    ));
                }
                vec![("from_account", from_account), ("to_account", to_account)]
            }
        };
        for (field, value) in names {
            if value.trim().is_empty() {
                bail!(validation_error(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

impl UpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.money.amount.is_none()
            && self.money.currency.is_none()
            && self.money.currency_amount.is_none()
            && self.notes.is_none()
    }
}

impl ChangedField {
    pub fn name(self) -> &'static str {
        match self {
            ChangedField::Amount => "amount",
            ChangedField::Notes => "notes",
            ChangedField::Currency => "currency",
            ChangedField::CurrencyAmount => "currency_amount",
        }
    }
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Requested fields in the order the native app emits their events.
    pub fn changed_fields(&self) -> Vec<ChangedField> {
        let mut fields = Vec::new();
        if self.amount.is_some() {
            fields.push(ChangedField::Amount);
        }
        if self.notes.is_some() {
            fields.push(ChangedField::Notes);
        }
        if self.currency.is_some() {
            fields.push(ChangedField::Currency);
        }
        if self.currency_amount.is_some() {
            fields.push(ChangedField::CurrencyAmount);
        }
        fields
    }
}

impl<T> BatchResult<T> {
    pub fn new() -> BatchResult<T> {
        BatchResult {
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.successful.is_empty(), self.failed.is_empty()) {
            (true, true) => BatchOutcome::Empty,
            (false, true) => BatchOutcome::AllSucceeded,
            (false, false) => BatchOutcome::PartiallySucceeded,
            (true, false) => BatchOutcome::AllFailed,
        }
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> BatchResult<T> {
        BatchResult::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn expense_details() -> RecordDetails {
        RecordDetails::Expense {
            account: "Cash".to_string(),
            category: "Food".to_string(),
            subcategory: "Groceries".to_string(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
    }

    #[test]
    fn test_draft_rejects_non_positive_amount() {
        let err = TransactionDraft::new(date(), Decimal::ZERO, None, expense_details()).unwrap_err();
        match err.kind() {
            ErrorKind::InvalidMonetaryInput(fields, _) => assert_eq!(fields, &vec!["amount"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_draft_rejects_same_transfer_accounts() {
        let err = TransactionDraft::new(
            date(),
            Decimal::from(10),
            None,
            RecordDetails::Transfer {
                from_account: "Cash".to_string(),
                to_account: "Cash".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_draft_requires_currency_amount_with_currency() {
        let draft = TransactionDraft::new(date(), Decimal::from(10), None, expense_details()).unwrap();
        assert!(draft
            .clone()
            .with_foreign(Some(CurrencyCode::from_str("EUR").unwrap()), None)
            .is_err());
        assert!(draft
            .with_foreign(None, Some(Decimal::from_str("9.50").unwrap()))
            .is_ok());
    }

    #[test]
    fn test_changed_fields_order() {
        let changes = RecordChanges {
            amount: None,
            notes: Some("note".to_string()),
            currency: None,
            currency_amount: Some(Decimal::from(5)),
        };
        assert_eq!(
            changes.changed_fields(),
            vec![ChangedField::Notes, ChangedField::CurrencyAmount]
        );
        assert!(RecordChanges::default().is_empty());
    }

    #[test]
    fn test_batch_outcome() {
        let mut result: BatchResult<u32> = BatchResult::new();
        assert_eq!(result.outcome(), BatchOutcome::Empty);
        result.failed.push((1, validation_error("bad")));
        assert_eq!(result.outcome(), BatchOutcome::AllFailed);
    }
}
