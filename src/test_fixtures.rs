use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::database::Database;
use crate::exchange_rates::FixedRates;
use crate::models::*;
use crate::sync_config::SyncConfig;
use crate::types::*;

pub const PRIMARY_DEVICE_ID: &str = "PRIMARY-DEVICE-0001";
pub const TABLET_DEVICE_ID: &str = "TABLET-DEVICE-0002";

const FIXTURE_SCHEMA: &str = r#"
CREATE TABLE Account (
    key INTEGER PRIMARY KEY, name TEXT NOT NULL, accountType INTEGER DEFAULT 0,
    balance REAL DEFAULT 0, currency TEXT, deviceIdKey INTEGER, deviceKey INTEGER
);
CREATE TABLE Category (
    key INTEGER PRIMARY KEY, name TEXT NOT NULL, deviceIdKey INTEGER, deviceKey INTEGER,
    seqNum INTEGER DEFAULT 0
);
CREATE TABLE SubCategory (
    key INTEGER PRIMARY KEY, catKey INTEGER NOT NULL, name TEXT NOT NULL,
    deviceIdKey INTEGER, deviceKey INTEGER, seqNum INTEGER DEFAULT 0
);
CREATE TABLE Expense (
    key INTEGER PRIMARY KEY, date TEXT, catKey INTEGER, subCatKey INTEGER, amount REAL,
    periods INTEGER, notes TEXT, isDetailEntry TEXT, masterKey INTEGER,
    includesReceipt TEXT, payFrom INTEGER, payeeKey INTEGER, billKey INTEGER,
    deviceIdKey INTEGER, deviceKey INTEGER, timeStamp TEXT, currency TEXT,
    currencyAmount TEXT, recurringKey INTEGER, isCategorySplit TEXT
);
CREATE TABLE Income (
    key INTEGER PRIMARY KEY, date TEXT, name TEXT, amount REAL, notes TEXT,
    addIncomeTo INTEGER, deviceIdKey INTEGER, deviceKey INTEGER, timeStamp TEXT,
    currency TEXT, currencyAmount TEXT
);
CREATE TABLE Transfer (
    key INTEGER PRIMARY KEY, transferDate TEXT, fromAccount INTEGER, toAccount INTEGER,
    amount REAL, notes TEXT, deviceIdKey INTEGER, deviceKey INTEGER, currency TEXT,
    currencyAmount TEXT
);
CREATE TABLE AccountTrans (
    key INTEGER PRIMARY KEY, accountKey INTEGER, timeStamp TEXT, transType INTEGER,
    transKey INTEGER, transDate TEXT, transAmount REAL, checked TEXT
);
CREATE TABLE DeviceInfo (
    key INTEGER PRIMARY KEY, deviceId TEXT, isPrimary TEXT, isActive TEXT
);
CREATE TABLE Settings (key INTEGER PRIMARY KEY, currency TEXT);
CREATE TABLE SyncUpdate (
    key INTEGER PRIMARY KEY, updateType TEXT, uuid TEXT, payload TEXT
);

INSERT INTO DeviceInfo (key, deviceId, isPrimary, isActive) VALUES
    (1, 'PRIMARY-DEVICE-0001', 'Y', 'Y'),
    (2, 'TABLET-DEVICE-0002', 'N', 'Y');
INSERT INTO Settings (key, currency) VALUES (1, 'SGD');
INSERT INTO Account (key, name, currency, deviceIdKey, deviceKey) VALUES
    (1, 'Cash', 'SGD', 1, 101),
    (2, 'Bank', 'SGD', 2, 102),
    (3, 'Wallet USD', 'USD', 1, 103),
    (4, 'Wallet JPY', 'JPY', NULL, NULL),
    (5, 'Wallet EUR', 'EUR', 1, 105);
INSERT INTO Category (key, name, deviceIdKey, deviceKey) VALUES (1, 'Food', 1, 201);
INSERT INTO SubCategory (key, catKey, name, deviceIdKey, deviceKey) VALUES
    (1, 1, 'Groceries', 1, 301),
    (2, 1, 'Restaurant', NULL, NULL);
"#;

/// In-memory ledger seeded with a small set of accounts and devices.
pub fn ledger() -> Database {
    let connection =
        SqliteConnection::establish(":memory:").expect("in-memory database should open");
    connection
        .batch_execute(FIXTURE_SCHEMA)
        .expect("fixture schema should load");
    Database::from_connection(connection)
}

/// Rates against USD: 1 USD buys 1.35 SGD, 150 JPY or 0.9 EUR.
pub fn rates() -> FixedRates {
    let mut table = HashMap::new();
    table.insert(currency("SGD"), decimal("1.35"));
    table.insert(currency("JPY"), decimal("150"));
    table.insert(currency("EUR"), decimal("0.9"));
    FixedRates::new(table)
}

pub fn sync_config() -> SyncConfig {
    SyncConfig::embedded().expect("embedded sync config should parse")
}

pub fn decimal(value: &str) -> Decimal {
    Decimal::from_str(value).expect("test decimal should parse")
}

pub fn currency(code: &str) -> CurrencyCode {
    CurrencyCode::from_str(code).expect("test currency should parse")
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 3).expect("test date should be valid")
}

pub fn expense_draft(amount: &str) -> TransactionDraft {
    expense_draft_for("Cash", amount)
}

pub fn expense_draft_for(account: &str, amount: &str) -> TransactionDraft {
    TransactionDraft::new(
        date(),
        decimal(amount),
        Some("Weekly shop".to_string()),
        RecordDetails::Expense {
            account: account.to_string(),
            category: "Food".to_string(),
            subcategory: "Groceries".to_string(),
        },
    )
    .expect("test expense draft should be valid")
}

pub fn income_draft(amount: &str) -> TransactionDraft {
    TransactionDraft::new(
        date(),
        decimal(amount),
        None,
        RecordDetails::Income {
            account: "Bank".to_string(),
            name: "Salary".to_string(),
        },
    )
    .expect("test income draft should be valid")
}

pub fn transfer_draft(amount: &str) -> TransactionDraft {
    transfer_draft_between("Cash", "Bank", amount)
}

pub fn transfer_draft_between(from: &str, to: &str, amount: &str) -> TransactionDraft {
    TransactionDraft::new(
        date(),
        decimal(amount),
        Some("Top up".to_string()),
        RecordDetails::Transfer {
            from_account: from.to_string(),
            to_account: to.to_string(),
        },
    )
    .expect("test transfer draft should be valid")
}
