//! Core valuation pipeline: ledger, caches, timeline, engine, report.

pub mod cache;
pub mod currency;
pub mod dates;
pub mod ledger;
pub mod log;
pub mod price;
pub mod report;
pub mod valuation;

// Re-export main types for cleaner imports
pub use cache::{PriceCache, RateCache, SyncStats};
pub use currency::RateSource;
pub use ledger::{Ledger, Transaction};
pub use price::{Lookup, PriceSource};
pub use report::Report;
pub use valuation::{HoldingValue, ValuationPoint};
