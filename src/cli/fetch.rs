//! The fetch phase: resolve every missing (ticker, month) price and
//! (currency, month) rate, then persist the merged caches.

use crate::cli::ui;
use crate::config::AppConfig;
use crate::core::cache::{PriceCache, RateCache, SyncStats};
use crate::core::dates::month_sequence;
use crate::core::ledger::Ledger;
use crate::providers::yahoo::{YahooPriceSource, YahooRateSource};
use anyhow::Result;
use tracing::info;

pub async fn run(config: &AppConfig) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let ledger = Ledger::load(&config.ledger, today)?;
    let months = month_sequence(ledger.earliest_purchase(), today);
    let tickers = ledger.tickers();
    let currencies = ledger.foreign_currencies(&config.currency);
    info!(
        "Fetching {} tickers and {} currency pairs over {} months",
        tickers.len(),
        currencies.len(),
        months.len()
    );

    let base_url = config.yahoo_base_url();
    let price_source = YahooPriceSource::new(base_url)?;
    let rate_source = YahooRateSource::new(base_url)?;

    let mut prices = PriceCache::load(config.price_cache_path()?)?;
    let mut rates = RateCache::load(config.rate_cache_path()?)?;

    let total_pairs = (tickers.len() + currencies.len()) * months.len();
    let pb = ui::new_progress_bar(total_pairs as u64, true);

    pb.set_message("Fetching month-start prices...");
    let price_stats = prices.sync(&price_source, &tickers, &months, &pb).await;

    pb.set_message("Fetching exchange rates...");
    let rate_stats = rates
        .sync(&rate_source, &currencies, &config.currency, &months, &pb)
        .await;

    pb.finish_and_clear();

    // Flush before any build can read the caches.
    prices.persist()?;
    rates.persist()?;

    print_stats("Prices", price_stats);
    print_stats("Rates", rate_stats);
    Ok(())
}

fn print_stats(label: &str, stats: SyncStats) {
    println!(
        "{}: {} newly fetched, {} from cache, {} unavailable",
        ui::style_text(label, ui::StyleType::TotalLabel),
        stats.fetched,
        stats.reused,
        stats.unavailable
    );
}
