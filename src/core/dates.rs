//! Month-start date arithmetic shared by the caches and the valuation engine.

use chrono::{Datelike, NaiveDate};

/// First calendar day of `date`'s month.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("the first of an existing month is a valid date")
}

/// First calendar day of the month after `date`'s month.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .expect("the first of an existing month is a valid date")
}

/// Every month-start from `start`'s month through `end`'s month, inclusive.
///
/// Strictly ascending with no gaps; empty when `start` is in a later month
/// than `end`.
pub fn month_sequence(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let last = month_start(end);
    let mut months = Vec::new();
    let mut current = month_start(start);
    while current <= last {
        months.push(current);
        current = next_month(current);
    }
    months
}
