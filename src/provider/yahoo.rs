use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::DataProvider;
use crate::error::DashboardError;
use crate::types::{PriceRecord, PriceSeries, Symbol};

pub const YAHOO_FINANCE_API: &str = "https://query1.finance.yahoo.com";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; stock-price-predictor/0.1)";
const PRICE_DECIMALS: u32 = 4;

/// Daily bars from the Yahoo Finance chart API.
#[derive(Debug, Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
}

impl YahooFinanceClient {
    pub fn new(base_url: impl Into<String>, user_agent: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> String {
        // period2 is exclusive, so step past the end date
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        let period2 = (end + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(period1);

        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history&includeAdjustedClose=true",
            self.base_url,
            symbol.as_str(),
            period1,
            period2
        )
    }
}

#[async_trait]
impl DataProvider for YahooFinanceClient {
    async fn fetch(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries, DashboardError> {
        let url = self.chart_url(symbol, start, end);
        info!("Fetching daily prices for {} from {} to {}", symbol, start, end);
        debug!("GET {}", url);

        let unavailable = |reason: String| DashboardError::data_unavailable(symbol.as_str(), reason);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| unavailable(format!("failed to read response: {}", e)))?;

        // Unknown symbols come back as a non-2xx status with a chart.error payload
        match serde_json::from_str::<ChartResponse>(&body) {
            Ok(chart) => parse_chart(symbol, chart),
            Err(_) if !status.is_success() => Err(unavailable(format!("HTTP {}", status))),
            Err(e) => Err(unavailable(format!("malformed chart response: {}", e))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn price(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(PRICE_DECIMALS))
}

/// Convert a chart payload into a validated series.
///
/// Rows without a close are skipped; when two rows share a date the later one wins.
pub(crate) fn parse_chart(symbol: &Symbol, response: ChartResponse) -> Result<PriceSeries, DashboardError> {
    if let Some(err) = response.chart.error {
        return Err(DashboardError::data_unavailable(
            symbol.as_str(),
            format!("{} ({})", err.description, err.code),
        ));
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| DashboardError::data_unavailable(symbol.as_str(), "empty chart result"))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let mut by_date = BTreeMap::new();
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(close) = at(&quote.close, i).and_then(price) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };

        let field = |values: &[Option<f64>]| at(values, i).and_then(price).unwrap_or(close);
        by_date.insert(
            date,
            PriceRecord {
                date,
                open: field(&quote.open),
                high: field(&quote.high),
                low: field(&quote.low),
                close,
                adj_close: field(&adjclose),
                volume: at(&quote.volume, i).map(|v| v.max(0.0) as u64).unwrap_or(0),
            },
        );
    }

    if by_date.is_empty() {
        return Err(DashboardError::data_unavailable(symbol.as_str(), "no records in range"));
    }

    PriceSeries::new(symbol.clone(), by_date.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(json: &str) -> Result<PriceSeries, DashboardError> {
        let symbol: Symbol = "GOOG".parse().unwrap();
        parse_chart(&symbol, serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_chart_rows() {
        // 2024-01-02 and 2024-01-03 14:30 UTC, plus a repeated live row for 01-03
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704205800,1704292200,1704310000],
            "indicators":{
                "quote":[{"open":[139.6,138.6,139.0],"high":[140.6,141.0,141.2],"low":[137.7,138.4,138.9],
                          "close":[139.56,140.36,140.9],"volume":[20071900,18974300,19000000]}],
                "adjclose":[{"adjclose":[139.3,140.1,140.6]}]
            }}],"error":null}}"#;

        let series = parse(json).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.dates()[0], NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        let last = series.last().unwrap();
        assert_eq!(last.close, dec!(140.9));
        assert_eq!(last.adj_close, dec!(140.6));
        assert_eq!(last.volume, 19_000_000);
    }

    #[test]
    fn test_parse_chart_skips_null_close_and_defaults_adjclose() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704205800,1704292200],
            "indicators":{"quote":[{"open":[1.0,null],"high":[1.0,null],"low":[1.0,null],
                                    "close":[10.5,null],"volume":[100,null]}]}
            }],"error":null}}"#;

        let series = parse(json).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.records()[0].adj_close, dec!(10.5));
    }

    #[test]
    fn test_parse_chart_error_payload() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse(json).unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
        assert!(err.to_string().contains("symbol may be delisted"));
    }

    #[test]
    fn test_parse_chart_without_rows() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse(json).is_err());
    }

    #[test]
    fn test_chart_url_covers_end_date() {
        let client = YahooFinanceClient::new("https://example.test/", None, 5).unwrap();
        let url = client.chart_url(
            &"msft".parse().unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        assert_eq!(
            url,
            "https://example.test/v8/finance/chart/MSFT?period1=1704067200&period2=1704240000&interval=1d&events=history&includeAdjustedClose=true"
        );
    }
}
