//! The valuation engine: replays the ledger over a monthly timeline and
//! prices each holding from the caches.
//!
//! This is a pure read over the caches; fetching happens in its own phase
//! and must have persisted before a build starts.

use crate::core::cache::{PriceCache, RateCache};
use crate::core::currency::major_unit;
use crate::core::dates::month_sequence;
use crate::core::ledger::Ledger;
use crate::core::price::Lookup;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One ticker's contribution to a month's valuation.
///
/// `price` is the per-unit price in the ticker's native quote units (pence
/// for GBX listings); `value` is in the base currency. `value` is `None`
/// when the ticker had to be excluded because no price or rate was ever
/// known for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingValue {
    pub ticker: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub value: Option<f64>,
    pub estimated: bool,
}

/// Portfolio valuation at one month boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub date: NaiveDate,
    pub holdings: Vec<HoldingValue>,
    pub total_value: f64,
    pub cost_basis: f64,
    /// True when any holding was stale-filled or excluded this month.
    pub estimated: bool,
}

/// Cumulative position for one ticker as of a month boundary.
#[derive(Debug, Default)]
struct Position {
    quantity: f64,
    /// quantity × unit_price + fees, summed in the native currency.
    native_cost: f64,
    currency: Option<String>,
}

/// Computes one `ValuationPoint` per month from the earliest purchase's
/// month through `today`'s month, inclusive.
///
/// A transaction dated exactly on a month-start is held at that boundary;
/// a mid-month purchase first counts at the next one. When a price (or
/// rate) is unavailable for a held ticker the most recent known value is
/// carried forward and the point is flagged as estimated; a ticker with no
/// known price at all is excluded from the total, also flagged, never
/// silently valued at zero.
pub fn compute(
    ledger: &Ledger,
    prices: &PriceCache,
    rates: &RateCache,
    base_currency: &str,
    today: NaiveDate,
) -> Vec<ValuationPoint> {
    let months = month_sequence(ledger.earliest_purchase(), today);
    let transactions = ledger.transactions();

    let mut positions: BTreeMap<String, Position> = BTreeMap::new();
    let mut last_price: HashMap<String, f64> = HashMap::new();
    let mut last_rate: HashMap<String, f64> = HashMap::new();
    let mut cursor = 0;

    let mut points = Vec::with_capacity(months.len());
    for &month in &months {
        // Transactions sorted by date; a purchase on the boundary counts.
        while cursor < transactions.len() && transactions[cursor].purchase_date <= month {
            let transaction = &transactions[cursor];
            let position = positions.entry(transaction.ticker.clone()).or_default();
            position.quantity += transaction.quantity;
            position.native_cost +=
                transaction.quantity * transaction.unit_price + transaction.fees;
            position.currency = transaction.currency.clone();
            cursor += 1;
        }

        let mut holdings = Vec::with_capacity(positions.len());
        let mut total_value = 0.0;
        let mut cost_basis = 0.0;
        let mut estimated = false;

        for (ticker, position) in &positions {
            let native_code = position.currency.as_deref().unwrap_or(base_currency);
            let (rate_code, divisor) = major_unit(native_code);

            let (price, price_estimated) = match prices.lookup(ticker, month) {
                Lookup::Found(p) => {
                    last_price.insert(ticker.clone(), p);
                    (Some(p), false)
                }
                Lookup::Unavailable => {
                    debug!("Price unavailable for {ticker} at {month}, using last known");
                    (last_price.get(ticker).copied(), true)
                }
                Lookup::Missing => {
                    warn!("Price for {ticker} at {month} was never fetched; run the fetch phase");
                    (last_price.get(ticker).copied(), true)
                }
            };

            let (rate, rate_estimated) = if rate_code == base_currency {
                (Some(1.0), false)
            } else {
                match rates.lookup(rate_code, month) {
                    Lookup::Found(r) => {
                        last_rate.insert(rate_code.to_string(), r);
                        (Some(r), false)
                    }
                    Lookup::Unavailable => {
                        debug!("Rate {rate_code}->{base_currency} unavailable at {month}, using last known");
                        (last_rate.get(rate_code).copied(), true)
                    }
                    Lookup::Missing => {
                        warn!("Rate {rate_code}->{base_currency} at {month} was never fetched; run the fetch phase");
                        (last_rate.get(rate_code).copied(), true)
                    }
                }
            };

            let value = match (price, rate) {
                (Some(price), Some(rate)) => {
                    let value = position.quantity * (price / divisor) * rate;
                    total_value += value;
                    estimated |= price_estimated || rate_estimated;
                    Some(value)
                }
                _ => {
                    warn!("Excluding {ticker} from {month}: no price or rate ever known");
                    estimated = true;
                    None
                }
            };

            match rate {
                Some(rate) => cost_basis += (position.native_cost / divisor) * rate,
                None => estimated = true,
            }

            holdings.push(HoldingValue {
                ticker: ticker.clone(),
                quantity: position.quantity,
                price,
                value,
                estimated: price_estimated || rate_estimated || value.is_none(),
            });
        }

        points.push(ValuationPoint {
            date: month,
            holdings,
            total_value,
            cost_basis,
            estimated,
        });
    }

    points
}
