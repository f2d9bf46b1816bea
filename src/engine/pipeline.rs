use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::backtest::BacktestReport;
use super::forecast::Forecast;
use super::online::OnlineUpdate;
use super::session::{MarketView, Session};
use crate::error::DashboardError;
use crate::indicators::MovingAverageSeries;
use crate::provider::{fetch_history, fetch_latest, DataProvider};
use crate::types::{PriceRecord, PriceSeries, Symbol};

const PREVIEW_ROWS: usize = 5;

/// User controls for one dashboard run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRequest {
    pub symbol: Symbol,
    pub days: usize,
    /// Apply one online-learning step after rendering
    #[serde(default)]
    pub learn: bool,
}

/// A dashboard section that either rendered or carries the reason it did not.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Feature<T> {
    Ready { value: T },
    Unavailable { reason: String },
}

impl<T> Feature<T> {
    pub fn from_result(section: &str, result: Result<T, DashboardError>) -> Self {
        match result {
            Ok(value) => Feature::Ready { value },
            Err(e) => {
                warn!("{} unavailable: {}", section, e);
                Feature::Unavailable { reason: e.to_string() }
            }
        }
    }

    pub fn unavailable(reason: impl ToString) -> Self {
        Feature::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Feature::Ready { .. })
    }
}

/// Raw data section: size, split point and the first/last few rows.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub records: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub split_index: usize,
    pub head: Vec<PriceRecord>,
    pub tail: Vec<PriceRecord>,
}

impl HistoryView {
    fn new(view: &MarketView) -> Self {
        Self {
            records: view.series.len(),
            first_date: view.series.first_date().unwrap_or(view.last_date),
            last_date: view.last_date,
            split_index: view.split_index,
            head: view.series.head(PREVIEW_ROWS).to_vec(),
            tail: view.series.tail(PREVIEW_ROWS).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub symbol: Symbol,
    pub generated_at: DateTime<Utc>,
    pub history: Feature<HistoryView>,
    pub moving_averages: Feature<Vec<MovingAverageSeries>>,
    pub backtest: Feature<BacktestReport>,
    pub forecast: Feature<Forecast>,
    /// Present only when the run asked for an update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online_update: Option<Feature<OnlineUpdate>>,
}

/// Network results for one run, fetched before the session is touched.
#[derive(Debug)]
pub struct Gathered {
    pub history: Result<PriceSeries, DashboardError>,
    pub latest: Option<Result<PriceRecord, DashboardError>>,
}

pub async fn gather(
    provider: &dyn DataProvider,
    request: &DashboardRequest,
    today: NaiveDate,
    history_years: u32,
) -> Gathered {
    let history = fetch_history(provider, &request.symbol, today, history_years).await;
    let latest = if request.learn && history.is_ok() {
        Some(fetch_latest(provider, &request.symbol, today).await)
    } else {
        None
    };

    Gathered { history, latest }
}

/// Build the report from fetched data. Each section fails on its own.
pub fn render(session: &mut Session, request: &DashboardRequest, gathered: Gathered) -> DashboardReport {
    let generated_at = Utc::now();
    let view = gathered.history.and_then(|series| session.load(series));

    let view = match view {
        Ok(view) => view,
        Err(e) => {
            warn!("Dashboard for {} has no data: {}", request.symbol, e);
            let reason = e.to_string();
            return DashboardReport {
                symbol: request.symbol.clone(),
                generated_at,
                history: Feature::unavailable(&reason),
                moving_averages: Feature::unavailable(&reason),
                backtest: Feature::unavailable(&reason),
                forecast: Feature::unavailable(&reason),
                online_update: request.learn.then(|| Feature::unavailable(&reason)),
            };
        }
    };

    let backtest = Feature::from_result("Backtest", session.backtest(&view));
    let forecast = Feature::from_result("Forecast", session.forecast(&view, request.days));
    let online_update = gathered.latest.map(|latest| {
        Feature::from_result(
            "Online update",
            latest.and_then(|observation| session.online_update(&view, &observation)),
        )
    });

    info!(
        "Rendered dashboard for {} (backtest={}, forecast={})",
        request.symbol,
        backtest.is_ready(),
        forecast.is_ready()
    );

    DashboardReport {
        symbol: request.symbol.clone(),
        generated_at,
        history: Feature::Ready {
            value: HistoryView::new(&view),
        },
        moving_averages: Feature::Ready {
            value: view.moving_averages.clone(),
        },
        backtest,
        forecast,
        online_update,
    }
}

/// Fetch and render in one go, for callers that own the session outright.
pub async fn run(
    provider: &dyn DataProvider,
    session: &mut Session,
    request: &DashboardRequest,
    today: NaiveDate,
    history_years: u32,
) -> DashboardReport {
    let gathered = gather(provider, request, today, history_years).await;
    render(session, request, gathered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppSettings;
    use crate::ml::{LstmConfig, LstmPredictor, Predictor};
    use crate::provider::MockDataProvider;
    use crate::types::fixtures::{record, series};

    impl<T> Feature<T> {
        fn ready(&self) -> Option<&T> {
            match self {
                Feature::Ready { value } => Some(value),
                Feature::Unavailable { .. } => None,
            }
        }

        fn reason(&self) -> Option<&str> {
            match self {
                Feature::Ready { .. } => None,
                Feature::Unavailable { reason } => Some(reason),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 18).unwrap()
    }

    fn request(learn: bool) -> DashboardRequest {
        DashboardRequest {
            symbol: Symbol::default(),
            days: 3,
            learn,
        }
    }

    fn settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.model.window = 4;
        settings.forecast.moving_average_windows = vec![5, 10];
        settings
    }

    fn wave(n: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 10.0).collect();
        series(&closes)
    }

    fn provider_with_history(n: usize) -> MockDataProvider {
        let mut provider = MockDataProvider::new();
        provider.expect_fetch().returning(move |_, start, _| {
            // the one-day lookback for the latest point starts yesterday
            if start == NaiveDate::from_ymd_opt(2024, 10, 17).unwrap() {
                let next_day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
                Ok(PriceSeries::new(Symbol::default(), vec![record(next_day, 104.0)]).unwrap())
            } else {
                Ok(wave(n))
            }
        });
        provider
    }

    fn session_with_model() -> Session {
        let model: Box<dyn Predictor> = Box::new(LstmPredictor::new(LstmConfig::new(4, 4), 11));
        Session::new(&settings(), Ok(model))
    }

    #[tokio::test]
    async fn test_full_dashboard() {
        let provider = provider_with_history(60);
        let mut session = session_with_model();

        let report = run(&provider, &mut session, &request(true), today(), 20).await;

        let history = report.history.ready().unwrap();
        assert_eq!(history.records, 60);
        assert_eq!(history.split_index, 42);
        assert_eq!(history.head.len(), 5);
        assert_eq!(report.moving_averages.ready().unwrap().len(), 2);
        assert_eq!(report.backtest.ready().unwrap().len(), 18 - 4);
        assert_eq!(report.forecast.ready().unwrap().points.len(), 3);

        let update = report.online_update.unwrap();
        assert_eq!(update.ready().unwrap().updates_applied, 1);
        assert_eq!(session.summary().updates_applied, 1);
    }

    #[tokio::test]
    async fn test_missing_model_keeps_data_sections() {
        let provider = provider_with_history(60);
        let mut session = Session::new(
            &settings(),
            Err(DashboardError::model_load("models/none.json", "model file not found")),
        );

        let report = run(&provider, &mut session, &request(false), today(), 20).await;

        assert!(report.history.is_ready());
        assert!(report.moving_averages.is_ready());
        assert!(report.backtest.reason().unwrap().contains("disabled"));
        assert!(!report.forecast.is_ready());
        assert!(report.online_update.is_none());
    }

    #[tokio::test]
    async fn test_data_unavailable_skips_everything() {
        let mut provider = MockDataProvider::new();
        provider
            .expect_fetch()
            .times(1)
            .returning(|symbol, _, _| Err(DashboardError::data_unavailable(symbol.as_str(), "HTTP 404 Not Found")));
        let mut session = session_with_model();

        let report = run(&provider, &mut session, &request(true), today(), 20).await;

        for reason in [
            report.history.reason(),
            report.moving_averages.reason(),
            report.backtest.reason(),
            report.forecast.reason(),
        ] {
            assert!(reason.unwrap().contains("HTTP 404"));
        }
        assert!(!report.online_update.unwrap().is_ready());
        assert_eq!(session.summary().updates_applied, 0);
    }

    #[tokio::test]
    async fn test_failed_latest_fetch_only_disables_update() {
        let mut provider = MockDataProvider::new();
        provider.expect_fetch().returning(|symbol, start, _| {
            if start == NaiveDate::from_ymd_opt(2024, 10, 17).unwrap() {
                Err(DashboardError::data_unavailable(symbol.as_str(), "no records in range"))
            } else {
                Ok(wave(60))
            }
        });
        let mut session = session_with_model();

        let report = run(&provider, &mut session, &request(true), today(), 20).await;

        assert!(report.backtest.is_ready());
        assert!(report.forecast.is_ready());
        assert!(!report.online_update.unwrap().is_ready());
        assert_eq!(session.summary().updates_applied, 0);
    }

    #[tokio::test]
    async fn test_zero_days_is_reported_on_forecast_only() {
        let provider = provider_with_history(60);
        let mut session = session_with_model();
        let mut req = request(false);
        req.days = 0;

        let report = run(&provider, &mut session, &req, today(), 20).await;
        assert!(report.backtest.is_ready());
        assert!(report.forecast.reason().unwrap().contains("positive"));
    }

    #[test]
    fn test_feature_serializes_with_status_tag() {
        let ready: Feature<u32> = Feature::Ready { value: 7 };
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["value"], 7);

        let missing: Feature<u32> = Feature::unavailable("model file not found");
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "model file not found");
    }
}
