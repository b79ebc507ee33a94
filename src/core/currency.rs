//! Exchange-rate capability and currency code normalization.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// External exchange-rate capability.
///
/// Resolves the `currency` → `base` conversion rate at the nearest trading
/// day at or after `date`. `Ok(None)` means the source has no data for the
/// pair around that date.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self, currency: &str, base: &str, date: NaiveDate) -> Result<Option<f64>>;
}

/// Major-unit form of a currency code, plus the divisor that converts
/// prices quoted in the minor unit.
///
/// London listings quote in pence (`GBX`/`GBp`); rates are only published
/// for the major unit, so the rate lookup and the price must be normalized
/// consistently.
pub fn major_unit(code: &str) -> (&str, f64) {
    match code {
        "GBX" | "GBp" => ("GBP", 100.0),
        other => (other, 1.0),
    }
}
