use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::*;
use crate::types::*;

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    base: String,
    rates: HashMap<String, f64>,
}

/// Client for the exchangerate-api.com "latest" endpoint.
#[derive(Debug)]
pub struct ForexClient {
    base_url: String,
    timeout: Duration,
}

impl ForexClient {
    pub fn new(base_url: &str, timeout: Duration) -> ForexClient {
        ForexClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Returns units of each currency bought by one unit of `base`.
    pub fn get_latest_rates(&self, base: CurrencyCode) -> Result<HashMap<String, f64>> {
        let rates_url = format!("{}/{}", self.base_url, base);
        info!("Getting latest exchange rates for {} from API...", base);
        debug!("Exchange rate API URL: {}", rates_url);
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .chain_err(|| "Failed to build HTTP client")?;
        let response = client
            .get(&rates_url)
            .send()
            .chain_err(|| "Failed to get response")?
            .error_for_status()
            .chain_err(|| "Error response")?
            .json::<LatestRatesResponse>()
            .chain_err(|| "Failed to parse response")?;
        ensure!(
            response.base.eq_ignore_ascii_case(&base.to_str()),
            "Response base currency {} does not match requested {}",
            response.base,
            base
        );
        Ok(response.rates)
    }
}
