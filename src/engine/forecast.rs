use chrono::NaiveDate;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::DashboardError;
use crate::ml::{predict_one, MinMaxScaler, Predictor};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    /// Days ahead of the last known close, starting at 1
    pub day: usize,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub days: usize,
    pub start_after: NaiveDate,
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    pub fn new(start_after: NaiveDate, prices: Vec<f64>) -> Self {
        let points = prices
            .into_iter()
            .enumerate()
            .map(|(i, price)| ForecastPoint { day: i + 1, price })
            .collect::<Vec<_>>();

        Self {
            days: points.len(),
            start_after,
            points,
        }
    }
}

/// Autoregressive rollout: each prediction becomes the newest input of the next step.
///
/// Errors compound with the horizon since later steps see model output, not
/// observed prices.
#[derive(Debug, Clone, Copy)]
pub struct FutureForecaster {
    window: usize,
}

impl FutureForecaster {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// `steps` future prices in rollout order, from the last `window` real prices.
    ///
    /// Zero steps yields an empty forecast; rejecting it is the caller's job.
    pub fn forecast(
        &self,
        steps: usize,
        recent: &[f64],
        scaler: &MinMaxScaler,
        predictor: &dyn Predictor,
    ) -> Result<Vec<f64>, DashboardError> {
        if recent.len() < self.window {
            return Err(DashboardError::InsufficientHistory {
                needed: self.window,
                available: recent.len(),
            });
        }

        let start = recent.len() - self.window;
        let mut window: VecDeque<f64> = scaler.transform(&recent[start..]).into();
        let mut predicted = Vec::with_capacity(steps);

        for step in 0..steps {
            let next = predict_one(predictor, window.make_contiguous())?;
            debug!("Rollout step {}: {:.6}", step + 1, next);

            predicted.push(next);
            window.pop_front();
            window.push_back(next);
        }

        let prices = scaler.inverse_transform(&predicted);
        if !prices.is_empty() {
            info!("Forecast {} days ahead with {}", prices.len(), predictor.name());
        }
        Ok(prices)
    }
}
