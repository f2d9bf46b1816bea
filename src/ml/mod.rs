pub mod lstm;
pub mod predictor;
pub mod scaler;

pub use lstm::{LstmConfig, LstmPredictor};
pub use predictor::*;
pub use scaler::*;

use std::path::Path;
use tracing::warn;

use crate::error::DashboardError;

/// Load the session predictor, checking it was trained on `expected_window` prices.
pub fn load_model(path: &Path, expected_window: usize) -> Result<Box<dyn Predictor>, DashboardError> {
    if !path.exists() {
        warn!("Model file not found at {}", path.display());
        return Err(DashboardError::model_load(path, "model file not found"));
    }

    let model = LstmPredictor::load(path).map_err(|e| DashboardError::model_load(path, format!("{:#}", e)))?;
    if model.window_len() != expected_window {
        return Err(DashboardError::model_load(
            path,
            format!(
                "model expects windows of {} prices but the dashboard is configured for {}",
                model.window_len(),
                expected_window
            ),
        ));
    }

    Ok(Box::new(model))
}
