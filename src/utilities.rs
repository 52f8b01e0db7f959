use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::*;

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

pub fn parse_iso_date(iso_date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(iso_date.trim(), ISO_DATE_FORMAT).map_err(|_| {
        validation_error(format!(
            "Invalid ISO date string (YYYY-MM-DD): {}",
            iso_date
        ))
    })
}

pub fn format_timestamp(time_stamp: NaiveDateTime) -> String {
    time_stamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn current_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

pub fn parse_decimal(value: &str, label: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|_| validation_error(format!("Invalid {} (not a number): {}", label, value)))
}

/// Converts a SQLite REAL through its shortest decimal representation, so a
/// stored `25.5` comes back as `25.5` rather than its binary expansion.
pub fn decimal_from_f64(value: f64) -> Result<Decimal> {
    Decimal::from_str(&value.to_string())
        .chain_err(|| format!("Stored amount is not a finite number: {}", value))
}

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_iso_date("2025-02-03").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
        );
        assert!(parse_iso_date("03/02/2025").unwrap_err().is_validation());
    }

    #[test]
    fn test_format_timestamp() {
        let time_stamp = NaiveDate::from_ymd_opt(2025, 2, 3)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap();
        assert_eq!(format_timestamp(time_stamp), "2025-02-03 04:05:06");
    }

    #[test]
    fn test_decimal_from_f64_uses_shortest_representation() {
        assert_eq!(decimal_from_f64(25.5).unwrap().to_string(), "25.5");
        assert_eq!(decimal_from_f64(0.1).unwrap().to_string(), "0.1");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(" 12.30 ", "amount").unwrap().to_string(), "12.30");
        assert!(parse_decimal("twelve", "amount").unwrap_err().is_validation());
    }
}
