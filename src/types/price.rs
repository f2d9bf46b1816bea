use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DashboardError;

pub const DEFAULT_SYMBOL: &str = "GOOG";

/// Upper-cased ticker symbol, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self(DEFAULT_SYMBOL.to_string())
    }
}

impl FromStr for Symbol {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DashboardError::InvalidSeries("stock symbol must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }
}

impl TryFrom<String> for Symbol {
    type Error = DashboardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One trading day of price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Close adjusted for splits and dividends; equals `close` when the source has none.
    pub adj_close: Decimal,
    pub volume: u64,
}

/// Chronological daily price history for one symbol.
///
/// Dates are strictly increasing; the constructor rejects anything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: Symbol,
    records: Vec<PriceRecord>,
}

impl PriceSeries {
    pub fn new(symbol: Symbol, records: Vec<PriceRecord>) -> Result<Self, DashboardError> {
        if let Some(pair) = records.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(DashboardError::InvalidSeries(format!(
                "dates must be strictly increasing ({} followed by {})",
                pair[0].date, pair[1].date
            )));
        }
        Ok(Self { symbol, records })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    pub fn last(&self) -> Option<&PriceRecord> {
        self.records.last()
    }

    #[cfg(test)]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    pub fn closes_decimal(&self) -> Vec<Decimal> {
        self.records.iter().map(|r| r.close).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.records.iter().map(|r| to_f64(r.close)).collect()
    }

    /// Adjusted closes of the last `n` records (fewer when the series is shorter).
    pub fn last_n_adj_closes(&self, n: usize) -> Vec<f64> {
        let start = self.records.len().saturating_sub(n);
        self.records[start..].iter().map(|r| to_f64(r.adj_close)).collect()
    }

    /// Adjusted closes of the last `n` records dated strictly before `date`.
    pub fn adj_closes_before(&self, date: NaiveDate, n: usize) -> Vec<f64> {
        let end = self.records.partition_point(|r| r.date < date);
        let start = end.saturating_sub(n);
        self.records[start..end].iter().map(|r| to_f64(r.adj_close)).collect()
    }

    /// Index where the held-out tail starts: `floor(len * ratio)`.
    pub fn split_index(&self, ratio: f64) -> usize {
        let idx = (self.records.len() as f64 * ratio).floor() as usize;
        idx.min(self.records.len())
    }

    pub fn tail_from(&self, index: usize) -> PriceSeries {
        let start = index.min(self.records.len());
        Self {
            symbol: self.symbol.clone(),
            records: self.records[start..].to_vec(),
        }
    }

    pub fn head(&self, n: usize) -> &[PriceRecord] {
        &self.records[..n.min(self.records.len())]
    }

    pub fn tail(&self, n: usize) -> &[PriceRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration;
    use rust_decimal::prelude::FromPrimitive;

    pub fn record(date: NaiveDate, close: f64) -> PriceRecord {
        let close = Decimal::from_f64(close).unwrap();
        PriceRecord {
            date,
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: 1_000,
        }
    }

    /// Consecutive calendar days starting 2024-01-01.
    pub fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let records = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| record(start + Duration::days(i as i64), c))
            .collect();
        PriceSeries::new(Symbol::default(), records).unwrap()
    }
}
