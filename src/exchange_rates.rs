use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::errors::*;
use crate::forex_client::*;
use crate::types::*;
use crate::utilities::*;

/// Source of exchange rates.
pub trait RateProvider {
    /// Units of `to` bought by one unit of `from`.
    fn rate(&self, from: CurrencyCode, to: CurrencyCode) -> Result<Decimal>;
}

/// Rates against the reference currency (USD), as published by the forex API.
type RateTable = HashMap<CurrencyCode, Decimal>;

/// Treats every currency pair as 1:1.  Used when rate lookups are disabled.
#[derive(Debug, Default)]
pub struct UnitRates;

/// A fixed table of rates against the reference currency.
#[derive(Debug)]
pub struct FixedRates {
    rates: RateTable,
}

#[derive(Debug, Deserialize, Serialize)]
struct RatesCacheFile {
    base: String,
    timestamp: String,
    rates: HashMap<String, f64>,
}

/// Forex API rates cached in a JSON file for a limited time.  When the API
/// cannot be reached a stale cache is used, and with no cache at all every
/// rate falls back to 1.0.
pub struct ForexRates {
    client: ForexClient,
    cache_file: PathBuf,
    ttl: Duration,
    cache: RefCell<Option<RateTable>>,
}

impl RateProvider for UnitRates {
    fn rate(&self, _from: CurrencyCode, _to: CurrencyCode) -> Result<Decimal> {
        Ok(Decimal::ONE)
    }
}

impl FixedRates {
    pub fn new(rates: HashMap<CurrencyCode, Decimal>) -> FixedRates {
        FixedRates { rates }
    }
}

impl RateProvider for FixedRates {
    fn rate(&self, from: CurrencyCode, to: CurrencyCode) -> Result<Decimal> {
        cross_rate(&self.rates, from, to)
    }
}

impl ForexRates {
    pub fn new(client: ForexClient, cache_file: PathBuf, ttl_hours: u64) -> ForexRates {
        ForexRates {
            client,
            cache_file,
            ttl: Duration::hours(ttl_hours as i64),
            cache: RefCell::new(None),
        }
    }

    fn rate_table(&self) -> Result<RateTable> {
        if let Some(table) = self.cache.borrow().as_ref() {
            return Ok(table.clone());
        }
        let table = self.load_rate_table()?;
        *self.cache.borrow_mut() = Some(table.clone());
        Ok(table)
    }

    fn load_rate_table(&self) -> Result<RateTable> {
        let cached = self.read_cache_file();
        if let Some(file) = &cached {
            if self.is_fresh(file) {
                debug!("Using cached exchange rates from {}", file.timestamp);
                return rate_table_from(&file.rates);
            }
        }
        let reference = CurrencyCode::reference();
        match self.client.get_latest_rates(reference) {
            Ok(rates) => {
                let file = RatesCacheFile {
                    base: reference.to_string(),
                    timestamp: Utc::now().to_rfc3339(),
                    rates,
                };
                if let Err(err) = self.write_cache_file(&file) {
                    warn!("Failed to save exchange rate cache: {}", err);
                }
                rate_table_from(&file.rates)
            }
            Err(err) => {
                warn!("Failed to fetch exchange rates: {}", err);
                match cached {
                    Some(file) => {
                        warn!("Using stale exchange rates from {}", file.timestamp);
                        rate_table_from(&file.rates)
                    }
                    None => Ok(RateTable::new()),
                }
            }
        }
    }

    fn is_fresh(&self, file: &RatesCacheFile) -> bool {
        match DateTime::parse_from_rfc3339(&file.timestamp) {
            Ok(timestamp) => Utc::now().signed_duration_since(timestamp) < self.ttl,
            Err(_) => false,
        }
    }

    fn read_cache_file(&self) -> Option<RatesCacheFile> {
        let text = fs::read_to_string(&self.cache_file).ok()?;
        match serde_json::from_str::<RatesCacheFile>(&text) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(
                    "Ignoring unreadable exchange rate cache {}: {}",
                    self.cache_file.display(),
                    err
                );
                None
            }
        }
    }

    fn write_cache_file(&self, file: &RatesCacheFile) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            fs::create_dir_all(parent).chain_err(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }
        fs::write(&self.cache_file, serde_json::to_string_pretty(file)?)
            .chain_err(|| format!("Failed to write {}", self.cache_file.display()))
    }
}

impl RateProvider for ForexRates {
    fn rate(&self, from: CurrencyCode, to: CurrencyCode) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let table = self.rate_table()?;
        if table.is_empty() {
            warn!("No exchange rates available; using 1.0 for {} to {}", from, to);
            return Ok(Decimal::ONE);
        }
        cross_rate(&table, from, to)
    }
}

fn rate_table_from(rates: &HashMap<String, f64>) -> Result<RateTable> {
    let mut table = RateTable::new();
    for (code, &rate) in rates {
        if rate <= 0.0 {
            continue;
        }
        if let Ok(currency) = CurrencyCode::from_str(code) {
            table.insert(currency, decimal_from_f64(rate)?);
        }
    }
    Ok(table)
}

fn reference_rate(table: &RateTable, currency: CurrencyCode) -> Result<Decimal> {
    if currency == CurrencyCode::reference() {
        return Ok(Decimal::ONE);
    }
    table.get(&currency).cloned().ok_or_else(|| {
        validation_error(format!("No exchange rate available for currency {}", currency))
    })
}

fn cross_rate(table: &RateTable, from: CurrencyCode, to: CurrencyCode) -> Result<Decimal> {
    if from == to {
        return Ok(Decimal::ONE);
    }
    let from_rate = reference_rate(table, from)?;
    let to_rate = reference_rate(table, to)?;
    to_rate
        .checked_div(from_rate)
        .chain_err(|| format!("Cannot convert {} to {}", from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;
    use std::time::Duration as StdDuration;

    fn unreachable_client() -> ForexClient {
        ForexClient::new("http://127.0.0.1:9/v4/latest", StdDuration::from_millis(500))
    }

    fn cache_file(timestamp: &str) -> RatesCacheFile {
        let mut rates = HashMap::new();
        rates.insert("USD".to_string(), 1.0);
        rates.insert("SGD".to_string(), 1.35);
        rates.insert("JPY".to_string(), 150.0);
        RatesCacheFile {
            base: "USD".to_string(),
            timestamp: timestamp.to_string(),
            rates,
        }
    }

    #[test]
    fn test_fixed_rates_cross_rate() {
        let rates = rates();
        assert_eq!(
            rates.rate(currency("USD"), currency("SGD")).unwrap(),
            decimal("1.35")
        );
        assert_eq!(
            rates.rate(currency("JPY"), currency("USD")).unwrap().round_dp(6),
            decimal("0.006667")
        );
        assert_eq!(
            rates.rate(currency("EUR"), currency("EUR")).unwrap(),
            Decimal::ONE
        );
    }

    #[test]
    fn test_fixed_rates_unknown_currency() {
        assert!(rates()
            .rate(currency("GBP"), currency("USD"))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_unit_rates() {
        assert_eq!(
            UnitRates.rate(currency("JPY"), currency("SGD")).unwrap(),
            Decimal::ONE
        );
    }

    #[test]
    fn test_forex_rates_uses_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forex-rates.json");
        fs::write(
            &path,
            serde_json::to_string(&cache_file(&Utc::now().to_rfc3339())).unwrap(),
        )
        .unwrap();
        let rates = ForexRates::new(unreachable_client(), path, 1);
        assert_eq!(
            rates.rate(currency("USD"), currency("JPY")).unwrap(),
            decimal("150")
        );
    }

    #[test]
    fn test_forex_rates_falls_back_to_stale_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forex-rates.json");
        fs::write(
            &path,
            serde_json::to_string(&cache_file("2020-01-01T00:00:00+00:00")).unwrap(),
        )
        .unwrap();
        let rates = ForexRates::new(unreachable_client(), path, 1);
        assert_eq!(
            rates.rate(currency("USD"), currency("SGD")).unwrap(),
            decimal("1.35")
        );
    }

    #[test]
    fn test_forex_rates_without_cache_falls_back_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let rates = ForexRates::new(unreachable_client(), dir.path().join("missing.json"), 1);
        assert_eq!(
            rates.rate(currency("USD"), currency("SGD")).unwrap(),
            Decimal::ONE
        );
    }
}
