//! Transaction ledger: CSV input and validation.

use crate::core::currency::major_unit;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A single buy, immutable once loaded.
///
/// `unit_price` and `fees` are denominated in the transaction's native
/// trading `currency` (`None` = the portfolio's base currency).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub ticker: String,
    pub purchase_date: NaiveDate,
    pub quantity: f64,
    #[serde(rename = "purchase_price")]
    pub unit_price: f64,
    #[serde(rename = "transaction_fees")]
    pub fees: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Raw CSV row; validation happens against this before a `Transaction` is
/// built so errors can name the offending row.
#[derive(Debug, Deserialize)]
struct LedgerRow {
    ticker: String,
    purchase_date: String,
    quantity: f64,
    price: f64,
    transaction_fees: f64,
    #[serde(default)]
    currency: Option<String>,
}

/// The validated purchase history, sorted by purchase date.
#[derive(Debug, Clone)]
pub struct Ledger {
    transactions: Vec<Transaction>,
}

impl Ledger {
    /// Reads the ledger CSV. Any malformed row fails the whole load, before
    /// any fetching can happen.
    pub fn load(path: impl AsRef<Path>, today: NaiveDate) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open ledger file: {}", path.display()))?;

        let mut transactions = Vec::new();
        for (index, row) in reader.deserialize::<LedgerRow>().enumerate() {
            // 1-based, counting the header as row 1
            let row_number = index + 2;
            let row = row.with_context(|| {
                format!("Malformed ledger row {row_number} in {}", path.display())
            })?;
            let transaction = validate_row(row, row_number, today)
                .with_context(|| format!("Invalid ledger row {row_number} in {}", path.display()))?;
            transactions.push(transaction);
        }

        debug!("Loaded {} transactions from {}", transactions.len(), path.display());
        Self::from_transactions(transactions)
    }

    /// Builds a ledger from already-parsed transactions (sorts, checks
    /// per-ticker currency consistency, rejects an empty ledger).
    pub fn from_transactions(mut transactions: Vec<Transaction>) -> Result<Self> {
        if transactions.is_empty() {
            bail!("Ledger contains no transactions");
        }

        let mut currencies: BTreeMap<String, Option<String>> = BTreeMap::new();
        for transaction in &transactions {
            match currencies.get(&transaction.ticker) {
                Some(existing) if *existing != transaction.currency => bail!(
                    "Ticker {} appears with conflicting currencies ({:?} and {:?})",
                    transaction.ticker,
                    existing,
                    transaction.currency
                ),
                Some(_) => {}
                None => {
                    currencies.insert(transaction.ticker.clone(), transaction.currency.clone());
                }
            }
        }

        transactions.sort_by(|a, b| a.purchase_date.cmp(&b.purchase_date));
        Ok(Self { transactions })
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Date of the first purchase; anchors the valuation timeline.
    pub fn earliest_purchase(&self) -> NaiveDate {
        // Non-empty by construction, sorted on load.
        self.transactions[0].purchase_date
    }

    /// Distinct tickers, sorted.
    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self
            .transactions
            .iter()
            .map(|t| t.ticker.clone())
            .collect();
        tickers.sort();
        tickers.dedup();
        tickers
    }

    /// Distinct non-base currencies, normalized to major units, sorted.
    /// These are the pairs the rate cache must cover.
    pub fn foreign_currencies(&self, base_currency: &str) -> Vec<String> {
        let mut currencies: Vec<String> = self
            .transactions
            .iter()
            .filter_map(|t| t.currency.as_deref())
            .map(|code| major_unit(code).0.to_string())
            .filter(|code| code != base_currency)
            .collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }
}

fn validate_row(row: LedgerRow, row_number: usize, today: NaiveDate) -> Result<Transaction> {
    let ticker = row.ticker.trim().to_string();
    if ticker.is_empty() {
        bail!("ticker is empty");
    }

    let purchase_date = NaiveDate::parse_from_str(row.purchase_date.trim(), "%Y-%m-%d")
        .with_context(|| format!("purchase_date '{}' is not an ISO 8601 date", row.purchase_date))?;
    if purchase_date > today {
        bail!("purchase_date {purchase_date} is in the future");
    }
    if row.quantity <= 0.0 || !row.quantity.is_finite() {
        bail!("quantity must be positive, got {}", row.quantity);
    }
    if row.price < 0.0 || !row.price.is_finite() {
        bail!("price must be non-negative, got {}", row.price);
    }
    if row.transaction_fees < 0.0 || !row.transaction_fees.is_finite() {
        bail!("transaction_fees must be non-negative, got {}", row.transaction_fees);
    }

    let currency = row
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string);

    debug!("Parsed ledger row {row_number}: {ticker} on {purchase_date}");
    Ok(Transaction {
        ticker,
        purchase_date,
        quantity: row.quantity,
        unit_price: row.price,
        fees: row.transaction_fees,
        currency,
    })
}
