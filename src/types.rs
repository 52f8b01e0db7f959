use rust_decimal::Decimal;
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;

use crate::constants::*;
use crate::errors::*;
use crate::CURRENCY_CODE_REGEX;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CurrencyCode([u8; 3]);

/// Number of decimal places a monetary value is quantized to.  The ledger only
/// distinguishes whole-unit currencies from those with cents.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DecimalPlaces {
    Zero,
    Two,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RoundingPolicy {
    pub amount: DecimalPlaces,
    pub foreign_amount: DecimalPlaces,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Resource {
    Expense,
    Income,
    Transfer,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Action {
    Add,
    Update,
    Delete,
}

/// Sync operation name as the native app spells it, e.g. `AddExpense`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SyncOperation {
    pub action: Action,
    pub resource: Resource,
}

/// Entity tables that carry device identifiers.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
pub enum EntityTable {
    Account,
    Category,
    SubCategory,
}

impl CurrencyCode {
    pub fn from_str(code: &str) -> Result<CurrencyCode> {
        let normalized = code.trim().to_uppercase();
        if !CURRENCY_CODE_REGEX.is_match(&normalized) {
            bail!(validation_error(format!(
                "Invalid currency code (expected 3 letters): {}",
                code
            )));
        }
        match normalized.as_bytes() {
            [a, b, c] => Ok(CurrencyCode([*a, *b, *c])),
            _ => bail!("Invalid currency code: {}", code),
        }
    }

    pub fn to_str(&self) -> Cow<str> {
        // Safe to use 'from_utf8_lossy', since the bytes passed the
        // uppercase ASCII regex.
        String::from_utf8_lossy(&self.0)
    }

    pub fn reference() -> CurrencyCode {
        CurrencyCode::from_str(REFERENCE_CURRENCY).expect("REFERENCE_CURRENCY should be valid")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl DecimalPlaces {
    pub fn from_count(count: u32) -> Result<DecimalPlaces> {
        match count {
            0 => Ok(DecimalPlaces::Zero),
            2 => Ok(DecimalPlaces::Two),
            _ => bail!(validation_error(format!(
                "Decimal places must be 0 or 2, got {}",
                count
            ))),
        }
    }

    pub fn count(self) -> u32 {
        match self {
            DecimalPlaces::Zero => 0,
            DecimalPlaces::Two => 2,
        }
    }

    /// Rounds half to even, then fixes the scale so `25.5` becomes `25.50`.
    pub fn quantize(self, value: Decimal) -> Decimal {
        let mut result = value.round_dp(self.count());
        result.rescale(self.count());
        result
    }
}

impl RoundingPolicy {
    pub fn new(amount: DecimalPlaces, foreign_amount: DecimalPlaces) -> RoundingPolicy {
        RoundingPolicy {
            amount,
            foreign_amount,
        }
    }
}

impl Default for RoundingPolicy {
    fn default() -> RoundingPolicy {
        RoundingPolicy::new(DecimalPlaces::Two, DecimalPlaces::Two)
    }
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Expense, Resource::Income, Resource::Transfer];

    pub fn from_str(name: &str) -> Result<Resource> {
        match name.trim().to_lowercase().as_str() {
            "expense" => Ok(Resource::Expense),
            "income" => Ok(Resource::Income),
            "transfer" => Ok(Resource::Transfer),
            _ => bail!(validation_error(format!("Unknown resource: {}", name))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Resource::Expense => "expense",
            Resource::Income => "income",
            Resource::Transfer => "transfer",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Resource::Expense => "Expense",
            Resource::Income => "Income",
            Resource::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Add, Action::Update, Action::Delete];

    pub fn from_str(name: &str) -> Result<Action> {
        match name.trim().to_lowercase().as_str() {
            "add" => Ok(Action::Add),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            _ => bail!(validation_error(format!("Unknown operation: {}", name))),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Action::Add => "Add",
            Action::Update => "Update",
            Action::Delete => "Delete",
        }
    }
}

impl SyncOperation {
    pub fn new(action: Action, resource: Resource) -> SyncOperation {
        SyncOperation { action, resource }
    }

    pub fn name(self) -> String {
        format!("{}{}", self.action.title(), self.resource.title())
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl EntityTable {
    pub fn name(self) -> &'static str {
        match self {
            EntityTable::Account => "Account",
            EntityTable::Category => "Category",
            EntityTable::SubCategory => "SubCategory",
        }
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
