use log::{debug, warn};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::errors::*;
use crate::models::*;
use crate::normalizer::MonetaryInput;
use crate::types::*;
use crate::utilities::*;

/// A batch entry with its parameters decoded.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedOperation {
    Add(AddRequest),
    Update {
        resource: Resource,
        key: i32,
        request: UpdateRequest,
    },
    Delete {
        resource: Resource,
        key: i32,
    },
}

/// Batch file entries that parsed, plus one message per entry that did not.
#[derive(Debug, Default)]
pub struct LoadedBatch {
    pub operations: Vec<BatchOperation>,
    pub errors: Vec<String>,
}

/// Reads a JSON array of `{resource, operation, parameters}` objects.  With
/// `stop_on_error` the first malformed entry fails the load; otherwise it is
/// reported by index and skipped.
pub fn load_batch_file(path: &Path, stop_on_error: bool) -> Result<LoadedBatch> {
    let text = fs::read_to_string(path)
        .chain_err(|| format!("Failed to read batch file: {}", path.display()))?;
    let document: Value = serde_json::from_str(&text)
        .chain_err(|| format!("Failed to parse batch file: {}", path.display()))?;
    let items = match document {
        Value::Array(items) => items,
        _ => bail!(validation_error("Batch JSON must be an array of operations")),
    };
    let mut loaded = LoadedBatch::default();
    for (index, item) in items.into_iter().enumerate() {
        match parse_item(item) {
            Ok(operation) => loaded.operations.push(operation),
            Err(err) => {
                let message = format!("Item {}: {}", index + 1, err);
                if stop_on_error {
                    bail!(validation_error(message));
                }
                warn!("Skipping batch entry: {}", message);
                loaded.errors.push(message);
            }
        }
    }
    debug!(
        "Loaded {} batch operations ({} skipped)",
        loaded.operations.len(),
        loaded.errors.len()
    );
    Ok(loaded)
}

fn parse_item(item: Value) -> Result<BatchOperation> {
    ensure!(
        item.is_object(),
        validation_error("Operation must be a JSON object")
    );
    let operation: BatchOperation = serde_json::from_value(item)
        .map_err(|err| validation_error(format!("Invalid operation format: {}", err)))?;
    ensure!(
        !operation.resource.trim().is_empty() && !operation.operation.trim().is_empty(),
        validation_error("Operation requires resource and operation")
    );
    Ok(operation)
}

pub fn decode_operation(operation: &BatchOperation) -> Result<TypedOperation> {
    let resource = Resource::from_str(&operation.resource)?;
    let action = Action::from_str(&operation.operation)?;
    let parameters = Parameters {
        resource,
        values: &operation.parameters,
    };
    match action {
        Action::Add => Ok(TypedOperation::Add(parameters.add_request()?)),
        Action::Update => {
            let key = parameters.key()?;
            let request = parameters.update_request()?;
            if request.is_empty() {
                bail!(validation_error(format!(
                    "{} update requires at least one field",
                    resource.title()
                )));
            }
            Ok(TypedOperation::Update {
                resource,
                key,
                request,
            })
        }
        Action::Delete => Ok(TypedOperation::Delete {
            resource,
            key: parameters.key()?,
        }),
    }
}

struct Parameters<'a> {
    resource: Resource,
    values: &'a Map<String, Value>,
}

impl<'a> Parameters<'a> {
    fn label(&self, name: &str) -> String {
        format!("{} {}", self.resource.title(), name)
    }

    fn text(&self, name: &str) -> Result<Option<String>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(_) => bail!(validation_error(format!(
                "{} must be a string or number",
                self.label(name)
            ))),
        }
    }

    fn required_text(&self, name: &str) -> Result<String> {
        self.text(name)?
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| validation_error(format!("{} is required", self.label(name))))
    }

    fn decimal(&self, name: &str) -> Result<Option<Decimal>> {
        self.text(name)?
            .map(|text| parse_decimal(&text, &self.label(name)))
            .transpose()
    }

    fn currency(&self) -> Result<Option<CurrencyCode>> {
        self.text("currency")?
            .filter(|text| !text.trim().is_empty())
            .map(|text| CurrencyCode::from_str(&text))
            .transpose()
    }

    fn key(&self) -> Result<i32> {
        let label = self.label("key");
        let text = self
            .text("key")?
            .ok_or_else(|| validation_error(format!("{} is required", label)))?;
        text.trim()
            .parse::<i32>()
            .map_err(|_| validation_error(format!("{} must be an integer", label)))
    }

    fn money(&self) -> Result<MonetaryInput> {
        Ok(MonetaryInput {
            amount: self.decimal("amount")?,
            currency: self.currency()?,
            currency_amount: self.decimal("currency_amount")?,
            exchange_rate: self.decimal("exchange_rate")?,
        })
    }

    fn details(&self) -> Result<RecordDetails> {
        Ok(match self.resource {
            Resource::Expense => RecordDetails::Expense {
                account: self.required_text("account")?,
                category: self.required_text("category")?,
                subcategory: self.required_text("subcategory")?,
            },
            Resource::Income => RecordDetails::Income {
                account: self.required_text("account")?,
                name: self.required_text("name")?,
            },
            Resource::Transfer => RecordDetails::Transfer {
                from_account: self.required_text("from_account")?,
                to_account: self.required_text("to_account")?,
            },
        })
    }

    fn add_request(&self) -> Result<AddRequest> {
        Ok(AddRequest {
            date: parse_iso_date(&self.required_text("date")?)?,
            money: self.money()?,
            notes: self.text("notes")?,
            details: self.details()?,
        })
    }

    fn update_request(&self) -> Result<UpdateRequest> {
        Ok(UpdateRequest {
            money: self.money()?,
            notes: self.text("notes")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;
    use serde_json::json;

    fn operation(value: Value) -> BatchOperation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_add_with_numeric_amount() {
        let decoded = decode_operation(&operation(json!({
            "resource": "expense",
            "operation": "add",
            "parameters": {
                "date": "2025-02-03",
                "account": "Cash",
                "category": "Food",
                "subcategory": "Groceries",
                "amount": 25.5
            }
        })))
        .unwrap();
        match decoded {
            TypedOperation::Add(request) => {
                assert_eq!(request.date, date());
                assert_eq!(request.money.amount, Some(decimal("25.5")));
                assert_eq!(request.notes, None);
            }
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[test]
    fn test_decode_update_requires_key_and_field() {
        let missing_key = operation(json!({
            "resource": "income",
            "operation": "update",
            "parameters": {"notes": "x"}
        }));
        assert!(decode_operation(&missing_key).unwrap_err().is_validation());

        let no_fields = operation(json!({
            "resource": "income",
            "operation": "update",
            "parameters": {"key": 3}
        }));
        assert!(decode_operation(&no_fields).unwrap_err().is_validation());

        let string_key = operation(json!({
            "resource": "Income",
            "operation": "UPDATE",
            "parameters": {"key": "3", "currency": "usd", "currency_amount": "4"}
        }));
        match decode_operation(&string_key).unwrap() {
            TypedOperation::Update { resource, key, request } => {
                assert_eq!(resource, Resource::Income);
                assert_eq!(key, 3);
                assert_eq!(request.money.currency, Some(currency("USD")));
            }
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_resource() {
        let unknown = operation(json!({
            "resource": "budget",
            "operation": "add",
            "parameters": {}
        }));
        assert!(decode_operation(&unknown).unwrap_err().is_validation());
    }

    #[test]
    fn test_load_batch_file_reports_bad_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        fs::write(
            &path,
            json!([
                {"resource": "transfer", "operation": "delete", "parameters": {"key": 1}},
                "not an object",
                {"resource": "expense"}
            ])
            .to_string(),
        )
        .unwrap();
        let loaded = load_batch_file(&path, false).unwrap();
        assert_eq!(loaded.operations.len(), 1);
        assert_eq!(loaded.errors.len(), 2);
        assert!(loaded.errors[0].starts_with("Item 2:"));
        assert!(load_batch_file(&path, true).is_err());
    }

    #[test]
    fn test_load_batch_file_requires_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        fs::write(&path, "{}").unwrap();
        assert!(load_batch_file(&path, false).unwrap_err().is_validation());
    }
}
