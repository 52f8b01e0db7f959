#![warn(clippy::all)]

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate error_chain;

mod batch;
mod cli;
mod client;
mod codec;
mod constants;
mod database;
mod device_directory;
mod exchange_rates;
mod forex_client;
mod ledger;
mod models;
mod normalizer;
mod payload;
mod schema;
mod settings;
mod sync;
mod sync_config;
mod types;
mod ui_control;
mod utilities;

#[cfg(test)]
mod test_fixtures;

pub mod errors {
    error_chain! {
        foreign_links {
            Diesel(diesel::result::Error);
            Io(std::io::Error);
            Json(serde_json::Error);
        }

        errors {
            InvalidMonetaryInput(fields: Vec<String>, message: String) {
                description("invalid monetary input")
                display("Invalid monetary input ({}): {}", fields.join(", "), message)
            }
            Validation(message: String) {
                description("invalid input")
                display("{}", message)
            }
            NotFound(what: String) {
                description("not found")
                display("{} not found", what)
            }
            Duplicate(resource: String, details: Vec<(String, String)>) {
                description("duplicate record")
                display(
                    "Duplicate {}: {}",
                    resource,
                    details
                        .iter()
                        .map(|(field, value)| format!("{}={}", field, value))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            SyncMisconfigured(message: String) {
                description("sync misconfigured")
                display("Sync misconfigured: {}", message)
            }
            PayloadBase64(message: String) {
                description("payload is not valid base64")
                display("Payload base64 decoding failed: {}", message)
            }
            PayloadInflate(message: String) {
                description("payload is not a valid zlib stream")
                display("Payload decompression failed: {}", message)
            }
            PayloadUtf8 {
                description("payload is not valid UTF-8")
                display("Decompressed payload is not valid UTF-8")
            }
            PayloadParse(message: String) {
                description("payload is not a JSON object")
                display("Payload JSON parsing failed: {}", message)
            }
            PayloadTrailingData {
                description("payload has non-zero trailing data")
                display("Payload has non-zero bytes after the compressed stream")
            }
            UiControl(message: String) {
                description("UI control failed")
                display("UI control failed: {}", message)
            }
        }
    }

    impl Error {
        pub fn is_not_found(&self) -> bool {
            match self.kind() {
                ErrorKind::NotFound(_) => true,
                _ => false,
            }
        }

        pub fn is_validation(&self) -> bool {
            match self.kind() {
                ErrorKind::InvalidMonetaryInput(..) | ErrorKind::Validation(_) => true,
                _ => false,
            }
        }
    }

    pub fn validation_error<S: Into<String>>(message: S) -> Error {
        ErrorKind::Validation(message.into()).into()
    }

    pub fn monetary_error(fields: &[&str], message: &str) -> Error {
        ErrorKind::InvalidMonetaryInput(
            fields.iter().map(|field| field.to_string()).collect(),
            message.to_string(),
        )
        .into()
    }
}

pub use cli::run;
pub use client::{EmitMode, HomeBudgetClient};
pub use codec::{decode_payload, encode_payload, encode_payload_with, SyncPayload};
pub use database::Database;
pub use exchange_rates::{FixedRates, ForexRates, RateProvider, UnitRates};
pub use ledger::LedgerStore;
pub use models::*;
pub use normalizer::{MonetaryInput, NormalizedAmounts};
pub use sync_config::{CompressionSpec, FieldKind, FieldSource, FieldSpec, SyncConfig, ValueFormat};
pub use types::*;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref CURRENCY_CODE_REGEX: Regex =
        Regex::new(r"^[A-Z]{3}$").expect("CURRENCY_CODE_REGEX should be valid");
}
