use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::constants::*;
use crate::errors::*;
use crate::types::*;

const EMBEDDED_SYNC_CONFIG: &str = include_str!("sync-config.json");

/// Payload layout for every (resource, operation) pair, keyed by resource
/// name and then by operation name (`AddExpense`, ...).
#[derive(Clone, Debug, Deserialize)]
pub struct SyncConfig {
    resources: HashMap<String, HashMap<String, OperationConfig>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OperationConfig {
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub compression: CompressionSpec,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub struct CompressionSpec {
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    #[serde(default = "default_pad_if_smaller")]
    pub pad_if_smaller: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Constant {
        value: Value,
    },
    #[serde(rename = "operation")]
    OperationName,
    PrimaryDeviceId,
    KeySingular,
    KeyArray,
    #[serde(rename = "field")]
    FieldReference {
        source: FieldSource,
        #[serde(default)]
        format: Option<ValueFormat>,
        #[serde(default)]
        default: Option<Value>,
    },
    EntityDeviceKey {
        entity: EntityTable,
        source: FieldSource,
    },
    EntityDeviceId {
        entity: EntityTable,
        source: FieldSource,
    },
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Key,
    Date,
    Amount,
    Notes,
    Currency,
    CurrencyAmount,
    TimeStamp,
    Account,
    Category,
    Subcategory,
    Name,
    FromAccount,
    ToAccount,
    CurrencyAmountOrAmount,
    CurrencyOrAccountCurrency,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    String,
    Float,
    #[serde(rename = "isoformat")]
    IsoFormat,
}

fn default_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_min_size() -> usize {
    DEFAULT_PAYLOAD_MIN_SIZE
}

fn default_pad_if_smaller() -> bool {
    true
}

impl Default for CompressionSpec {
    fn default() -> CompressionSpec {
        CompressionSpec {
            level: DEFAULT_COMPRESSION_LEVEL,
            min_size: DEFAULT_PAYLOAD_MIN_SIZE,
            pad_if_smaller: true,
        }
    }
}

impl CompressionSpec {
    pub fn padded_to(min_size: usize) -> CompressionSpec {
        CompressionSpec {
            min_size,
            ..CompressionSpec::default()
        }
    }
}

impl SyncConfig {
    pub fn embedded() -> Result<SyncConfig> {
        SyncConfig::from_json_str(EMBEDDED_SYNC_CONFIG)
            .chain_err(|| "Failed to parse embedded sync configuration")
    }

    pub fn from_file(path: &Path) -> Result<SyncConfig> {
        let text = fs::read_to_string(path)
            .chain_err(|| format!("Failed to read sync configuration: {}", path.display()))?;
        SyncConfig::from_json_str(&text)
            .chain_err(|| format!("Failed to parse sync configuration: {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<SyncConfig> {
        let config: SyncConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn operation(&self, operation: SyncOperation) -> Result<&OperationConfig> {
        self.resources
            .get(operation.resource.name())
            .and_then(|operations| operations.get(&operation.name()))
            .ok_or_else(|| {
                ErrorKind::SyncMisconfigured(format!(
                    "no field specification for {}",
                    operation
                ))
                .into()
            })
    }

    /// Every configured operation must have fields, and compression levels
    /// must be ones zlib accepts.
    fn validate(&self) -> Result<()> {
        for (resource, operations) in &self.resources {
            Resource::from_str(resource)?;
            for (name, config) in operations {
                if config.fields.is_empty() {
                    bail!(ErrorKind::SyncMisconfigured(format!(
                        "{} has no fields",
                        name
                    )));
                }
                if config.compression.level > 9 {
                    bail!(ErrorKind::SyncMisconfigured(format!(
                        "{} compression level {} is not between 0 and 9",
                        name, config.compression.level
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_covers_every_operation() {
        let config = SyncConfig::embedded().unwrap();
        for &resource in Resource::ALL.iter() {
            for &action in Action::ALL.iter() {
                let operation = SyncOperation::new(action, resource);
                let spec = config.operation(operation).unwrap();
                assert_eq!(spec.fields[0].kind, FieldKind::OperationName);
                assert_eq!(spec.compression, CompressionSpec::default());
            }
        }
    }

    #[test]
    fn test_add_uses_key_array_and_update_uses_singular() {
        let config = SyncConfig::embedded().unwrap();
        let add = config
            .operation(SyncOperation::new(Action::Add, Resource::Expense))
            .unwrap();
        assert!(add
            .fields
            .iter()
            .any(|field| field.name == "expenseDeviceKeys" && field.kind == FieldKind::KeyArray));
        let update = config
            .operation(SyncOperation::new(Action::Update, Resource::Expense))
            .unwrap();
        assert!(update.fields.iter().any(
            |field| field.name == "expenseDeviceKey" && field.kind == FieldKind::KeySingular
        ));
    }

    #[test]
    fn test_parse_field_kinds() {
        let config = SyncConfig::from_json_str(
            r#"{"resources": {"income": {"AddIncome": {
                "fields": [
                    {"name": "Operation", "type": "operation"},
                    {"name": "flag", "type": "constant", "value": 1},
                    {"name": "notesString", "type": "field", "source": "notes", "default": ""},
                    {"name": "accountDeviceId", "type": "entity_device_id",
                     "entity": "Account", "source": "account"}
                ],
                "compression": {"min_size": 660, "pad_if_smaller": false}
            }}}}"#,
        )
        .unwrap();
        let spec = config
            .operation(SyncOperation::new(Action::Add, Resource::Income))
            .unwrap();
        assert_eq!(
            spec.fields[1].kind,
            FieldKind::Constant {
                value: Value::from(1)
            }
        );
        assert_eq!(
            spec.fields[2].kind,
            FieldKind::FieldReference {
                source: FieldSource::Notes,
                format: None,
                default: Some(Value::from("")),
            }
        );
        assert_eq!(
            spec.fields[3].kind,
            FieldKind::EntityDeviceId {
                entity: EntityTable::Account,
                source: FieldSource::Account,
            }
        );
        assert_eq!(
            spec.compression,
            CompressionSpec {
                level: 9,
                min_size: 660,
                pad_if_smaller: false,
            }
        );
    }

    #[test]
    fn test_missing_operation_is_misconfigured() {
        let config =
            SyncConfig::from_json_str(r#"{"resources": {"expense": {}}}"#).unwrap();
        let err = config
            .operation(SyncOperation::new(Action::Delete, Resource::Expense))
            .unwrap_err();
        match err.kind() {
            ErrorKind::SyncMisconfigured(_) => {}
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_field_type_is_rejected() {
        assert!(SyncConfig::from_json_str(
            r#"{"resources": {"expense": {"AddExpense": {
                "fields": [{"name": "x", "type": "mystery"}]
            }}}}"#
        )
        .is_err());
    }
}
