//! Price-source capability and cache lookup states.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// External market-data capability.
///
/// Implementations resolve the closing price of `ticker` at the nearest
/// trading day **at or after** `date`, in the ticker's native trading
/// currency. `Ok(None)` means the source has no data for that ticker around
/// the date (delisted, not yet listed); transport failures are `Err`.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_close(&self, ticker: &str, date: NaiveDate) -> Result<Option<f64>>;
}

/// Outcome of a cache lookup for a (key, month) pair.
///
/// `Unavailable` and `Missing` are deliberately distinct: the former is a
/// recorded source miss that must not be fetched again, the latter a pair
/// the fetch phase has never seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    /// A usable value is cached.
    Found(f64),
    /// The source was asked and had nothing.
    Unavailable,
    /// Never fetched.
    Missing,
}
