use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::DashboardError;
use crate::ml::{MinMaxScaler, Predictor};
use crate::types::PriceSeries;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// Predicted vs actual closes over the held-out tail.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub window: usize,
    pub points: Vec<BacktestPoint>,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
}

impl BacktestReport {
    fn new(window: usize, points: Vec<BacktestPoint>) -> Self {
        let n = points.len() as f64;
        let (rmse, mae) = if points.is_empty() {
            (None, None)
        } else {
            let sq: f64 = points.iter().map(|p| (p.predicted - p.actual).powi(2)).sum();
            let abs: f64 = points.iter().map(|p| (p.predicted - p.actual).abs()).sum();
            (Some((sq / n).sqrt()), Some(abs / n))
        };

        Self { window, points, rmse, mae }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Replays the model over every full window of the test tail.
///
/// Read-only with respect to the predictor.
#[derive(Debug, Clone, Copy)]
pub struct BacktestEvaluator {
    window: usize,
}

impl BacktestEvaluator {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn evaluate(
        &self,
        tail: &PriceSeries,
        scaler: &MinMaxScaler,
        predictor: &dyn Predictor,
    ) -> Result<BacktestReport, DashboardError> {
        let w = self.window;
        if tail.len() < w {
            return Err(DashboardError::InsufficientHistory {
                needed: w,
                available: tail.len(),
            });
        }

        let scaled = scaler.transform(&tail.closes());
        let windows: Vec<Vec<f64>> = (w..scaled.len()).map(|i| scaled[i - w..i].to_vec()).collect();
        if windows.is_empty() {
            return Ok(BacktestReport::new(w, Vec::new()));
        }
        let targets = &scaled[w..];

        debug!("Backtesting {} windows of {} prices", windows.len(), w);
        let predictions = predictor.predict(&windows)?;
        if predictions.len() != windows.len() {
            return Err(DashboardError::Prediction(anyhow::anyhow!(
                "{} returned {} predictions for {} windows",
                predictor.name(),
                predictions.len(),
                windows.len()
            )));
        }

        let actual = scaler.inverse_transform(targets);
        let predicted = scaler.inverse_transform(&predictions);
        let points: Vec<BacktestPoint> = tail.records()[w..]
            .iter()
            .zip(actual.into_iter().zip(predicted))
            .map(|(record, (actual, predicted))| BacktestPoint {
                date: record.date,
                actual,
                predicted,
            })
            .collect();

        let report = BacktestReport::new(w, points);
        info!(
            "Backtest on {}: {} points, rmse={:.4}",
            tail.symbol(),
            report.len(),
            report.rmse.unwrap_or(f64::NAN)
        );
        Ok(report)
    }
}
