use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::DashboardError;
use crate::ml::{predict_one, MinMaxScaler, Predictor};

/// Outcome of one online-learning step.
#[derive(Debug, Clone, Serialize)]
pub struct OnlineUpdate {
    pub observation_date: NaiveDate,
    pub observation: f64,
    /// Next-price estimate made before the weights changed
    pub predicted_next: f64,
    pub updates_applied: usize,
}

/// Predict-then-fit on a single new observation.
///
/// The fit permanently changes the predictor for the rest of the session.
/// The scaler is not refit, so prices drifting outside its range are scaled
/// beyond [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct OnlineUpdater {
    window: usize,
}

impl OnlineUpdater {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// `history` supplies the last `window - 1` real prices preceding `observation`.
    ///
    /// Returns the pre-update estimate in price scale.
    pub fn apply(
        &self,
        observation: f64,
        history: &[f64],
        scaler: &MinMaxScaler,
        predictor: &mut dyn Predictor,
    ) -> Result<f64, DashboardError> {
        let context = self.window.saturating_sub(1);
        if context == 0 || history.len() < context {
            return Err(DashboardError::InsufficientHistory {
                needed: context.max(1),
                available: history.len(),
            });
        }

        let mut sequence = history[history.len() - context..].to_vec();
        sequence.push(observation);
        let scaled = scaler.transform(&sequence);
        let (input, target) = scaled.split_at(context);
        let target = target[0];

        let prediction = predict_one(&*predictor, input)?;
        predictor.fit_one_step(input, target)?;

        let predicted_price = scaler.inverse_one(prediction);
        info!(
            "Online update with {}: observed {:.4}, pre-update estimate {:.4}",
            predictor.name(),
            observation,
            predicted_price
        );
        Ok(predicted_price)
    }
}
