// currency.rs
// Converts amounts between arbitrary currencies and the base currency.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Source of the latest conversion rates, keyed by currency code, relative
/// to `base` (1 base = rate units of the quoted currency).
pub trait RateProvider: Send + Sync {
    fn latest_rates<'a>(&'a self, base: &'a str) -> BoxFuture<'a, CoreResult<HashMap<String, f64>>>;
}

/// exchangerate-api.com style provider: `GET {url}/{key}/latest/{base}`.
pub struct ExchangeRateApi {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    conversion_rates: HashMap<String, f64>,
}

impl ExchangeRateApi {
    pub fn new(url: &str, api_key: &str) -> Self {
        ExchangeRateApi {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn fetch(&self, base: &str) -> Result<HashMap<String, f64>, reqwest::Error> {
        let url = format!("{}/{}/latest/{}", self.url, self.api_key, base);
        let body: LatestRates = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.conversion_rates)
    }
}

impl RateProvider for ExchangeRateApi {
    fn latest_rates<'a>(&'a self, base: &'a str) -> BoxFuture<'a, CoreResult<HashMap<String, f64>>> {
        Box::pin(async move {
            self.fetch(base)
                .await
                .map_err(|err| CoreError::RateUnavailable(format!("rate lookup failed: {err}")))
        })
    }
}

/// Provider used when no rate API key is configured: every lookup fails, so
/// only base-currency amounts are accepted.
pub struct NoRates;

impl RateProvider for NoRates {
    fn latest_rates<'a>(&'a self, _base: &'a str) -> BoxFuture<'a, CoreResult<HashMap<String, f64>>> {
        Box::pin(async {
            Err(CoreError::RateUnavailable(
                "no exchange rate provider configured".to_string(),
            ))
        })
    }
}

#[derive(Clone)]
pub struct CurrencyConverter {
    base: String,
    rates: Arc<dyn RateProvider>,
}

impl CurrencyConverter {
    pub fn new(base: &str, rates: Arc<dyn RateProvider>) -> Self {
        CurrencyConverter {
            base: base.trim().to_uppercase(),
            rates,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_base(&self, currency: &str) -> bool {
        currency.trim().eq_ignore_ascii_case(&self.base)
    }

    /// `amount` in `currency` expressed in the base currency.
    pub async fn to_base(&self, amount: f64, currency: &str) -> CoreResult<f64> {
        if self.is_base(currency) {
            return Ok(amount);
        }
        let rate = self.rate_for(currency).await?;
        Ok(to_base_with_rate(amount, rate))
    }

    /// Base-currency `amount` expressed in `currency`.
    pub async fn from_base(&self, amount: f64, currency: &str) -> CoreResult<f64> {
        if self.is_base(currency) {
            return Ok(amount);
        }
        let rate = self.rate_for(currency).await?;
        Ok(from_base_with_rate(amount, rate))
    }

    async fn rate_for(&self, currency: &str) -> CoreResult<f64> {
        let code = currency.trim().to_uppercase();
        debug!(base = %self.base, quote = %code, "fetching exchange rates");
        let table = self.rates.latest_rates(&self.base).await?;
        match table.get(&code) {
            Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
            _ => Err(CoreError::RateUnavailable(format!(
                "no {} rate for {code}",
                self.base
            ))),
        }
    }
}

pub fn to_base_with_rate(amount: f64, rate: f64) -> f64 {
    round2(amount / rate)
}

pub fn from_base_with_rate(amount: f64, rate: f64) -> f64 {
    round2(amount * rate)
}

/// Rounds half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
