pub mod yahoo;

pub use yahoo::*;

use async_trait::async_trait;
use chrono::{Duration, Months, NaiveDate};
use tracing::info;

use crate::error::DashboardError;
use crate::types::{PriceRecord, PriceSeries, Symbol};

/// Source of daily price history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Daily records for `symbol` between `start` and `end`, both inclusive.
    ///
    /// An unknown symbol or an empty range is `DataUnavailable`.
    async fn fetch(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries, DashboardError>;
}

/// Full history used by the dashboard: `years` back from `today`.
pub async fn fetch_history(
    provider: &dyn DataProvider,
    symbol: &Symbol,
    today: NaiveDate,
    years: u32,
) -> Result<PriceSeries, DashboardError> {
    let start = today
        .checked_sub_months(Months::new(years * 12))
        .unwrap_or(NaiveDate::MIN);
    let series = provider.fetch(symbol, start, today).await?;
    if series.is_empty() {
        return Err(DashboardError::data_unavailable(symbol.as_str(), "no records in range"));
    }

    info!(
        "Loaded {} daily records for {} ({} .. {})",
        series.len(),
        symbol,
        series.first_date().unwrap_or(start),
        series.last_date().unwrap_or(today)
    );
    Ok(series)
}

/// Most recent record from the last day, used as the online-update observation.
pub async fn fetch_latest(
    provider: &dyn DataProvider,
    symbol: &Symbol,
    today: NaiveDate,
) -> Result<PriceRecord, DashboardError> {
    let series = provider.fetch(symbol, today - Duration::days(1), today).await?;
    series
        .last()
        .cloned()
        .ok_or_else(|| DashboardError::data_unavailable(symbol.as_str(), "no new data point in the last day"))
}
