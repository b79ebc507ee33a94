//! Month-keyed price and exchange-rate caches with CSV persistence.
//!
//! Both caches share one lifecycle: load the CSV once at phase start
//! (corrupt rows are skipped with a warning), merge fetched values in
//! memory, persist once at phase end. A (key, month) pair is fetched at
//! most once; a source miss is recorded as an explicit unavailable marker
//! so later runs never retry it.

use crate::core::currency::RateSource;
use crate::core::price::{Lookup, PriceSource};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Counters reported after a sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Pairs already cached (including recorded misses).
    pub reused: usize,
    /// Pairs fetched successfully this run.
    pub fetched: usize,
    /// Pairs newly recorded as unavailable this run.
    pub unavailable: usize,
}

/// Sorted (key, month) → optional value table backing both caches.
/// A `None` value is the persisted unavailable marker.
#[derive(Debug, Default)]
struct MonthTable {
    entries: BTreeMap<(String, NaiveDate), Option<f64>>,
    dirty: bool,
}

impl MonthTable {
    fn load(path: &Path, label: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if !path.exists() {
            debug!("No {label} cache at {}, starting empty", path.display());
            return Ok(Self { entries, dirty: false });
        }

        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {label} cache: {}", path.display()))?;
        for (index, record) in reader.records().enumerate() {
            // 1-based, counting the header as row 1
            let row_number = index + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable {label} cache row {row_number}: {e}");
                    continue;
                }
            };
            match parse_row(&record) {
                // Duplicate keys collapse to the last row read.
                Some((key, date, value)) => {
                    entries.insert((key, date), value);
                }
                None => warn!("Skipping malformed {label} cache row {row_number}: {record:?}"),
            }
        }

        debug!("Loaded {} {label} cache entries from {}", entries.len(), path.display());
        Ok(Self { entries, dirty: false })
    }

    fn lookup(&self, key: &str, date: NaiveDate) -> Lookup {
        match self.entries.get(&(key.to_string(), date)) {
            Some(Some(value)) => Lookup::Found(*value),
            Some(None) => Lookup::Unavailable,
            None => Lookup::Missing,
        }
    }

    fn record(&mut self, key: String, date: NaiveDate, value: Option<f64>) {
        self.entries.insert((key, date), value);
        self.dirty = true;
    }

    fn persist(&self, path: &Path, header: [&str; 3], label: &str) -> Result<()> {
        if !self.dirty && path.exists() {
            debug!("{label} cache unchanged, skipping write");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to write {label} cache: {}", path.display()))?;
        writer.write_record(header)?;
        for ((key, date), value) in &self.entries {
            let date = date.format("%Y-%m-%d").to_string();
            let value = value.map(|v| v.to_string()).unwrap_or_default();
            writer.write_record([key.as_str(), date.as_str(), value.as_str()])?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {label} cache: {}", path.display()))?;

        debug!("Persisted {} {label} cache entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<(String, NaiveDate, Option<f64>)> {
    let key = record.get(0)?.trim();
    if key.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(record.get(1)?.trim(), "%Y-%m-%d").ok()?;
    let raw = record.get(2).unwrap_or("").trim();
    let value = if raw.is_empty() {
        None
    } else {
        Some(raw.parse::<f64>().ok()?)
    };
    Some((key.to_string(), date, value))
}

/// Persistent store of ticker × month-start → closing price.
///
/// Prices are stored keyed by the *requested* month-start date even when the
/// source resolved a nearby trading day, so lookups are always exact-key.
#[derive(Debug)]
pub struct PriceCache {
    table: MonthTable,
    path: PathBuf,
}

impl PriceCache {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = MonthTable::load(&path, "price")?;
        Ok(Self { table, path })
    }

    pub fn lookup(&self, ticker: &str, date: NaiveDate) -> Lookup {
        self.table.lookup(ticker, date)
    }

    /// Merges a price (or an unavailable marker) into the cache.
    pub fn insert(&mut self, ticker: &str, date: NaiveDate, close: Option<f64>) {
        self.table.record(ticker.to_string(), date, close);
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.table.entries.len()
    }

    /// Fetches every (ticker, month) pair not already cached. One pair's
    /// failure degrades to an unavailable marker and never aborts the rest.
    pub async fn sync(
        &mut self,
        source: &dyn PriceSource,
        tickers: &[String],
        months: &[NaiveDate],
        progress: &ProgressBar,
    ) -> SyncStats {
        let mut stats = SyncStats::default();
        for ticker in tickers {
            for &month in months {
                if self.table.lookup(ticker, month) != Lookup::Missing {
                    stats.reused += 1;
                    progress.inc(1);
                    continue;
                }
                match source.fetch_close(ticker, month).await {
                    Ok(Some(close)) if close > 0.0 => {
                        debug!("Fetched {ticker} {month}: {close}");
                        self.table.record(ticker.clone(), month, Some(close));
                        stats.fetched += 1;
                    }
                    Ok(Some(close)) => {
                        warn!("Discarding non-positive close {close} for {ticker} at {month}");
                        self.table.record(ticker.clone(), month, None);
                        stats.unavailable += 1;
                    }
                    Ok(None) => {
                        debug!("No price data for {ticker} around {month}");
                        self.table.record(ticker.clone(), month, None);
                        stats.unavailable += 1;
                    }
                    Err(e) => {
                        warn!("Price fetch failed for {ticker} at {month}: {e:#}");
                        self.table.record(ticker.clone(), month, None);
                        stats.unavailable += 1;
                    }
                }
                progress.inc(1);
            }
        }
        stats
    }

    pub fn persist(&self) -> Result<()> {
        self.table.persist(&self.path, ["ticker", "date", "close"], "price")
    }
}

/// Persistent store of currency × month-start → rate to the base currency.
/// Keys are major-unit currency codes (GBX holdings key as GBP).
#[derive(Debug)]
pub struct RateCache {
    table: MonthTable,
    path: PathBuf,
}

impl RateCache {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = MonthTable::load(&path, "rate")?;
        Ok(Self { table, path })
    }

    pub fn lookup(&self, currency: &str, date: NaiveDate) -> Lookup {
        self.table.lookup(currency, date)
    }

    pub fn insert(&mut self, currency: &str, date: NaiveDate, rate: Option<f64>) {
        self.table.record(currency.to_string(), date, rate);
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries.is_empty()
    }

    /// Fetches every (currency, month) pair not already cached, mirroring
    /// `PriceCache::sync`.
    pub async fn sync(
        &mut self,
        source: &dyn RateSource,
        currencies: &[String],
        base_currency: &str,
        months: &[NaiveDate],
        progress: &ProgressBar,
    ) -> SyncStats {
        let mut stats = SyncStats::default();
        for currency in currencies {
            for &month in months {
                if self.table.lookup(currency, month) != Lookup::Missing {
                    stats.reused += 1;
                    progress.inc(1);
                    continue;
                }
                match source.fetch_rate(currency, base_currency, month).await {
                    Ok(Some(rate)) if rate > 0.0 => {
                        debug!("Fetched {currency}->{base_currency} {month}: {rate}");
                        self.table.record(currency.clone(), month, Some(rate));
                        stats.fetched += 1;
                    }
                    Ok(Some(rate)) => {
                        warn!("Discarding non-positive rate {rate} for {currency} at {month}");
                        self.table.record(currency.clone(), month, None);
                        stats.unavailable += 1;
                    }
                    Ok(None) => {
                        debug!("No rate data for {currency}->{base_currency} around {month}");
                        self.table.record(currency.clone(), month, None);
                        stats.unavailable += 1;
                    }
                    Err(e) => {
                        warn!("Rate fetch failed for {currency}->{base_currency} at {month}: {e:#}");
                        self.table.record(currency.clone(), month, None);
                        stats.unavailable += 1;
                    }
                }
                progress.inc(1);
            }
        }
        stats
    }

    pub fn persist(&self) -> Result<()> {
        self.table.persist(&self.path, ["currency", "date", "rate"], "rate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    struct MockPriceSource {
        prices: HashMap<(String, NaiveDate), f64>,
        errors: Vec<String>,
        call_count: AtomicUsize,
    }

    impl MockPriceSource {
        fn new() -> Self {
            Self {
                prices: HashMap::new(),
                errors: Vec::new(),
                call_count: AtomicUsize::new(0),
            }
        }

        fn add_price(&mut self, ticker: &str, month: NaiveDate, close: f64) {
            self.prices.insert((ticker.to_string(), month), close);
        }

        fn add_error(&mut self, ticker: &str) {
            self.errors.push(ticker.to_string());
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for MockPriceSource {
        async fn fetch_close(&self, ticker: &str, date: NaiveDate) -> Result<Option<f64>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.errors.iter().any(|t| t == ticker) {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.prices.get(&(ticker.to_string(), date)).copied())
        }
    }

    struct MockRateSource {
        rate: f64,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl RateSource for MockRateSource {
        async fn fetch_rate(&self, _: &str, _: &str, _: NaiveDate) -> Result<Option<f64>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.rate))
        }
    }

    fn cache_in(dir: &tempfile::TempDir) -> PriceCache {
        PriceCache::load(dir.path().join("prices.csv")).unwrap()
    }

    #[tokio::test]
    async fn test_sync_fetches_only_missing_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_in(&dir);
        let mut source = MockPriceSource::new();
        source.add_price("AAPL", date(2023, 11), 170.0);
        source.add_price("AAPL", date(2023, 12), 180.0);

        let tickers = vec!["AAPL".to_string()];
        let months = vec![date(2023, 11), date(2023, 12)];
        let pb = ProgressBar::hidden();

        let stats = cache.sync(&source, &tickers, &months, &pb).await;
        assert_eq!(stats, SyncStats { reused: 0, fetched: 2, unavailable: 0 });
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.lookup("AAPL", date(2023, 11)), Lookup::Found(170.0));

        // Second pass with no calendar advance: zero network calls.
        let stats = cache.sync(&source, &tickers, &months, &pb).await;
        assert_eq!(stats, SyncStats { reused: 2, fetched: 0, unavailable: 0 });
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_prepopulated_pair_is_not_fetched_and_survives() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_in(&dir);
        cache.insert("AAPL", date(2023, 11), Some(170.0));

        let mut source = MockPriceSource::new();
        // The source would disagree; it must never be asked.
        source.add_price("AAPL", date(2023, 11), 999.0);

        let stats = cache
            .sync(&source, &["AAPL".to_string()], &[date(2023, 11)], &ProgressBar::hidden())
            .await;
        assert_eq!(stats.reused, 1);
        assert_eq!(source.calls(), 0);
        assert_eq!(cache.lookup("AAPL", date(2023, 11)), Lookup::Found(170.0));
    }

    #[tokio::test]
    async fn test_fetch_error_degrades_to_unavailable_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_in(&dir);
        let mut source = MockPriceSource::new();
        source.add_error("DEAD");
        source.add_price("AAPL", date(2023, 11), 170.0);

        let tickers = vec!["AAPL".to_string(), "DEAD".to_string()];
        let months = vec![date(2023, 11)];
        let stats = cache.sync(&source, &tickers, &months, &ProgressBar::hidden()).await;

        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.unavailable, 1);
        assert_eq!(cache.lookup("AAPL", date(2023, 11)), Lookup::Found(170.0));
        assert_eq!(cache.lookup("DEAD", date(2023, 11)), Lookup::Unavailable);

        // The recorded miss is never retried.
        let stats = cache.sync(&source, &tickers, &months, &ProgressBar::hidden()).await;
        assert_eq!(stats.reused, 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_persist_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");

        let mut cache = PriceCache::load(&path).unwrap();
        cache.insert("AAPL", date(2023, 11), Some(170.25));
        cache.insert("DEAD", date(2023, 11), None);
        cache.persist().unwrap();

        let reloaded = PriceCache::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.lookup("AAPL", date(2023, 11)), Lookup::Found(170.25));
        assert_eq!(reloaded.lookup("DEAD", date(2023, 11)), Lookup::Unavailable);
        assert_eq!(reloaded.lookup("AAPL", date(2023, 12)), Lookup::Missing);
    }

    #[test]
    fn test_load_skips_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(
            &path,
            "ticker,date,close\n\
             AAPL,2023-11-01,170.0\n\
             AAPL,not-a-date,10.0\n\
             MSFT,2023-11-01,banana\n\
             ,2023-11-01,5.0\n",
        )
        .unwrap();

        let cache = PriceCache::load(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("AAPL", date(2023, 11)), Lookup::Found(170.0));
    }

    #[test]
    fn test_duplicate_keys_collapse_to_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(
            &path,
            "ticker,date,close\n\
             AAPL,2023-11-01,170.0\n\
             AAPL,2023-11-01,171.5\n",
        )
        .unwrap();

        let cache = PriceCache::load(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("AAPL", date(2023, 11)), Lookup::Found(171.5));
    }

    #[tokio::test]
    async fn test_rate_cache_sync_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.csv");
        let mut cache = RateCache::load(&path).unwrap();
        let source = MockRateSource { rate: 1.25, call_count: AtomicUsize::new(0) };

        let currencies = vec!["GBP".to_string()];
        let months = vec![date(2023, 11), date(2023, 12)];
        let stats = cache
            .sync(&source, &currencies, "USD", &months, &ProgressBar::hidden())
            .await;
        assert_eq!(stats.fetched, 2);
        cache.persist().unwrap();

        let reloaded = RateCache::load(&path).unwrap();
        assert_eq!(reloaded.lookup("GBP", date(2023, 11)), Lookup::Found(1.25));

        let stats = cache
            .sync(&source, &currencies, "USD", &months, &ProgressBar::hidden())
            .await;
        assert_eq!(stats.reused, 2);
        assert_eq!(source.call_count.load(Ordering::SeqCst), 2);
    }
}
