use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::backtest::{BacktestEvaluator, BacktestReport};
use super::forecast::{Forecast, FutureForecaster};
use super::online::{OnlineUpdate, OnlineUpdater};
use crate::config::AppSettings;
use crate::error::DashboardError;
use crate::indicators::{moving_averages, MovingAverageSeries};
use crate::ml::{load_model, MinMaxScaler, Predictor, ScalerError};
use crate::types::{to_f64, PriceRecord, PriceSeries, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    DataLoaded,
    BacktestRendered,
    ForecastRendered,
    OnlineUpdateApplied,
}

/// Everything derived from one fresh fetch of a symbol's history.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub series: PriceSeries,
    pub last_date: NaiveDate,
    pub split_index: usize,
    pub test_tail: PriceSeries,
    pub moving_averages: Vec<MovingAverageSeries>,
    pub scaler: Result<MinMaxScaler, ScalerError>,
}

impl MarketView {
    fn scaler(&self) -> Result<MinMaxScaler, DashboardError> {
        self.scaler.clone().map_err(DashboardError::from)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub phase: SessionPhase,
    pub model: Option<String>,
    pub model_error: Option<String>,
    pub window: usize,
    pub updates_applied: usize,
    pub scaled_symbols: Vec<String>,
}

/// Owns the predictor and the per-symbol scalers for one dashboard process.
///
/// The predictor is loaded once. Only `online_update` mutates it, which
/// requires `&mut self`; callers sharing a session must serialize access.
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    window: usize,
    train_split: f64,
    ma_windows: Vec<usize>,
    predictor: Result<Box<dyn Predictor>, String>,
    scalers: HashMap<Symbol, MinMaxScaler>,
    phase: SessionPhase,
    updates_applied: usize,
}

impl Session {
    pub fn new(settings: &AppSettings, predictor: Result<Box<dyn Predictor>, DashboardError>) -> Self {
        let predictor = predictor.map_err(|e| {
            warn!("Prediction features disabled: {}", e);
            e.to_string()
        });

        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            window: settings.model.window,
            train_split: settings.forecast.train_split,
            ma_windows: settings.forecast.moving_average_windows.clone(),
            predictor,
            scalers: HashMap::new(),
            phase: SessionPhase::Idle,
            updates_applied: 0,
        };
        info!("Session {} started (window={})", session.id, session.window);
        session
    }

    /// Load the configured model from disk. A failed load still yields a session.
    pub fn open(settings: &AppSettings) -> Self {
        let predictor = load_model(&settings.model.path, settings.model.window);
        Self::new(settings, predictor)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn model_ready(&self) -> bool {
        self.predictor.is_ok()
    }

    pub fn summary(&self) -> SessionSummary {
        let mut scaled_symbols: Vec<String> = self.scalers.keys().map(|s| s.to_string()).collect();
        scaled_symbols.sort();

        SessionSummary {
            id: self.id,
            started_at: self.started_at,
            phase: self.phase,
            model: self.predictor.as_ref().ok().map(|p| p.name().to_string()),
            model_error: self.predictor.as_ref().err().cloned(),
            window: self.window,
            updates_applied: self.updates_applied,
            scaled_symbols,
        }
    }

    fn predictor(&self) -> Result<&dyn Predictor, DashboardError> {
        self.predictor
            .as_deref()
            .map_err(|reason| DashboardError::ModelUnavailable(reason.clone()))
    }

    fn predictor_mut(&mut self) -> Result<&mut dyn Predictor, DashboardError> {
        match &mut self.predictor {
            Ok(predictor) => Ok(&mut **predictor),
            Err(reason) => Err(DashboardError::ModelUnavailable(reason.clone())),
        }
    }

    /// Split a freshly fetched series and attach the symbol's scaler.
    ///
    /// The scaler is fit on the first load of a symbol's test tail and reused
    /// afterwards, even when later fetches would give a different range.
    pub fn load(&mut self, series: PriceSeries) -> Result<MarketView, DashboardError> {
        let last_date = series
            .last_date()
            .ok_or_else(|| DashboardError::data_unavailable(series.symbol().as_str(), "no records in range"))?;

        let split_index = series.split_index(self.train_split);
        let test_tail = series.tail_from(split_index);
        let moving_averages = moving_averages(&series, &self.ma_windows);

        let scaler = match self.scalers.get(series.symbol()) {
            Some(scaler) => Ok(*scaler),
            None => {
                let fitted = MinMaxScaler::fit(&test_tail.closes());
                match &fitted {
                    Ok(scaler) => {
                        info!(
                            "Fitted scaler for {} on {} test prices (min={:.4}, max={:.4})",
                            series.symbol(),
                            test_tail.len(),
                            scaler.min(),
                            scaler.max()
                        );
                        self.scalers.insert(series.symbol().clone(), *scaler);
                    }
                    Err(e) => warn!("Scaler unavailable for {}: {}", series.symbol(), e),
                }
                fitted
            }
        };

        self.phase = SessionPhase::DataLoaded;
        Ok(MarketView {
            series,
            last_date,
            split_index,
            test_tail,
            moving_averages,
            scaler,
        })
    }

    pub fn backtest(&mut self, view: &MarketView) -> Result<BacktestReport, DashboardError> {
        let predictor = self.predictor()?;
        let scaler = view.scaler()?;
        let report = BacktestEvaluator::new(self.window).evaluate(&view.test_tail, &scaler, predictor)?;
        self.phase = SessionPhase::BacktestRendered;
        Ok(report)
    }

    pub fn forecast(&mut self, view: &MarketView, days: usize) -> Result<Forecast, DashboardError> {
        if days == 0 {
            return Err(DashboardError::InvalidHorizon);
        }
        let predictor = self.predictor()?;
        let scaler = view.scaler()?;

        let recent = view.series.last_n_adj_closes(self.window);
        let prices = FutureForecaster::new(self.window).forecast(days, &recent, &scaler, predictor)?;
        self.phase = SessionPhase::ForecastRendered;
        Ok(Forecast::new(view.last_date, prices))
    }

    /// One predict-then-fit step on `observation`. The weight change is permanent.
    ///
    /// History rows dated on or after the observation are left out, so a
    /// fetch that repeats the last known day does not train on `[.., p, p]`.
    pub fn online_update(
        &mut self,
        view: &MarketView,
        observation: &PriceRecord,
    ) -> Result<OnlineUpdate, DashboardError> {
        let window = self.window;
        let scaler = view.scaler()?;
        let predictor = self.predictor_mut()?;

        let history = view
            .series
            .adj_closes_before(observation.date, window.saturating_sub(1));
        let observed = to_f64(observation.adj_close);
        let predicted_next = OnlineUpdater::new(window).apply(observed, &history, &scaler, predictor)?;

        self.updates_applied += 1;
        self.phase = SessionPhase::OnlineUpdateApplied;
        Ok(OnlineUpdate {
            observation_date: observation.date,
            observation: observed,
            predicted_next,
            updates_applied: self.updates_applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{LstmConfig, LstmPredictor, MockPredictor};
    use crate::types::fixtures::{record, series};

    fn settings(window: usize) -> AppSettings {
        let mut settings = AppSettings::default();
        settings.model.window = window;
        settings.forecast.moving_average_windows = vec![3];
        settings
    }

    fn ramp(n: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        series(&closes)
    }

    fn unavailable() -> Result<Box<dyn Predictor>, DashboardError> {
        Err(DashboardError::model_load("/missing/model.json", "model file not found"))
    }

    #[test]
    fn test_load_splits_and_computes_averages() {
        let mut session = Session::new(&settings(3), unavailable());
        assert_eq!(session.phase(), SessionPhase::Idle);

        let view = session.load(ramp(20)).unwrap();
        assert_eq!(view.split_index, 14);
        assert_eq!(view.test_tail.len(), 6);
        assert_eq!(view.moving_averages.len(), 1);
        assert_eq!(view.moving_averages[0].points.len(), 20);
        assert_eq!(view.scaler.unwrap().min(), 114.0);
        assert_eq!(session.phase(), SessionPhase::DataLoaded);
    }

    #[test]
    fn test_scaler_is_fit_once_per_symbol() {
        let mut session = Session::new(&settings(3), unavailable());
        let first = session.load(ramp(20)).unwrap().scaler.unwrap();

        let shifted: Vec<f64> = (0..20).map(|i| 500.0 + i as f64 * 2.0).collect();
        let second = session.load(series(&shifted)).unwrap().scaler.unwrap();

        assert_eq!(first, second);
        assert_eq!(session.summary().scaled_symbols, vec!["GOOG".to_string()]);
    }

    #[test]
    fn test_missing_model_disables_prediction_only() {
        let mut session = Session::new(&settings(3), unavailable());
        let view = session.load(ramp(20)).unwrap();
        assert!(!view.moving_averages.is_empty());

        assert!(matches!(session.backtest(&view), Err(DashboardError::ModelUnavailable(_))));
        assert!(matches!(session.forecast(&view, 3), Err(DashboardError::ModelUnavailable(_))));
        let obs = record(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), 130.0);
        assert!(matches!(
            session.online_update(&view, &obs),
            Err(DashboardError::ModelUnavailable(_))
        ));

        let summary = session.summary();
        assert!(summary.model.is_none());
        assert!(summary.model_error.unwrap().contains("not found"));
    }

    #[test]
    fn test_degenerate_series_reports_scaler_error() {
        let mut mock = MockPredictor::new();
        mock.expect_window_len().return_const(3usize);
        let mut session = Session::new(&settings(3), Ok(Box::new(mock)));

        let view = session.load(series(&[5.0; 10])).unwrap();
        assert!(matches!(view.scaler, Err(ScalerError::DegenerateRange { .. })));
        assert!(matches!(
            session.backtest(&view),
            Err(DashboardError::Scaler(ScalerError::DegenerateRange { .. }))
        ));
    }

    #[test]
    fn test_forecast_rejects_zero_days() {
        let model = LstmPredictor::new(LstmConfig::new(3, 4), 1);
        let mut session = Session::new(&settings(3), Ok(Box::new(model)));
        let view = session.load(ramp(20)).unwrap();

        assert!(matches!(session.forecast(&view, 0), Err(DashboardError::InvalidHorizon)));

        let forecast = session.forecast(&view, 4).unwrap();
        assert_eq!(forecast.points.len(), 4);
        assert_eq!(forecast.start_after, view.last_date);
        assert_eq!(session.phase(), SessionPhase::ForecastRendered);
    }

    #[test]
    fn test_backtest_uses_test_tail() {
        let mut mock = MockPredictor::new();
        mock.expect_name().return_const("mock");
        mock.expect_predict()
            .withf(|windows| windows.len() == 3)
            .returning(|windows| Ok(windows.iter().map(|w| w[w.len() - 1]).collect()));
        let mut session = Session::new(&settings(3), Ok(Box::new(mock)));

        let view = session.load(ramp(20)).unwrap();
        let report = session.backtest(&view).unwrap();
        assert_eq!(report.len(), view.test_tail.len() - 3);
        assert_eq!(report.points[0].date, view.test_tail.dates()[3]);
        assert_eq!(session.phase(), SessionPhase::BacktestRendered);
    }

    #[test]
    fn test_online_update_mutates_session_model() {
        let model = LstmPredictor::new(LstmConfig::new(4, 4).with_learning_rate(0.05), 3);
        let mut session = Session::new(&settings(4), Ok(Box::new(model)));
        let view = session.load(ramp(20)).unwrap();

        let before = session.forecast(&view, 2).unwrap();
        let again = session.forecast(&view, 2).unwrap();
        assert_eq!(before.points, again.points);

        let obs = record(NaiveDate::from_ymd_opt(2024, 1, 21).unwrap(), 125.0);
        let update = session.online_update(&view, &obs).unwrap();
        assert_eq!(update.updates_applied, 1);
        assert_eq!(update.observation, 125.0);
        assert_eq!(session.phase(), SessionPhase::OnlineUpdateApplied);

        let after = session.forecast(&view, 2).unwrap();
        assert_ne!(before.points, after.points);

        session.load(ramp(20)).unwrap();
        assert_eq!(session.phase(), SessionPhase::DataLoaded);
        assert_eq!(session.summary().updates_applied, 1);
    }

    #[test]
    fn test_online_update_skips_repeated_last_day() {
        let mut mock = MockPredictor::new();
        mock.expect_name().return_const("mock");
        // tail 114..=119 scales by 1/5: 117 -> 0.6, 118 -> 0.8, 119 -> 1.0
        mock.expect_predict()
            .withf(|windows| {
                windows.len() == 1
                    && windows[0].len() == 2
                    && (windows[0][0] - 0.6).abs() < 1e-9
                    && (windows[0][1] - 0.8).abs() < 1e-9
            })
            .times(1)
            .returning(|_| Ok(vec![0.9]));
        mock.expect_fit_one_step()
            .withf(|window, target| window.len() == 2 && (*target - 1.0).abs() < 1e-9)
            .times(1)
            .returning(|_, _| Ok(()));
        let mut session = Session::new(&settings(3), Ok(Box::new(mock)));
        let view = session.load(ramp(20)).unwrap();

        // the one-day fetch returned the row already at the end of the history
        let repeated = view.series.last().cloned().unwrap();
        let update = session.online_update(&view, &repeated).unwrap();

        assert_eq!(update.observation, 119.0);
        assert!((update.predicted_next - 118.5).abs() < 1e-9);
    }
}
