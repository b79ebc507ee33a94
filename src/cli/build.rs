//! The build phase: valuate the ledger against the persisted caches and
//! write the report document. Performs no fetching.

use crate::config::AppConfig;
use crate::core::cache::{PriceCache, RateCache};
use crate::core::ledger::Ledger;
use crate::core::report::Report;
use crate::core::valuation;
use anyhow::Result;
use tracing::warn;

pub fn run(config: &AppConfig) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let ledger = Ledger::load(&config.ledger, today)?;
    let prices = PriceCache::load(config.price_cache_path()?)?;
    let rates = RateCache::load(config.rate_cache_path()?)?;
    if prices.is_empty() {
        warn!("Price cache is empty; run `folio fetch` first");
    }

    let valuations = valuation::compute(&ledger, &prices, &rates, &config.currency, today);
    let estimated = valuations.iter().filter(|p| p.estimated).count();

    let report = Report::new(&ledger, &config.currency, valuations);
    let path = config.report_path()?;
    report.write(&path)?;

    println!(
        "Report with {} monthly points written to {}",
        report.valuations.len(),
        path.display()
    );
    if estimated > 0 {
        println!("{estimated} points carry estimated values (missing prices or rates)");
    }
    Ok(())
}
