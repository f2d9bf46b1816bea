use std::path::PathBuf;
use thiserror::Error;

use crate::ml::ScalerError;

/// Failures surfaced to the dashboard user.
///
/// Every variant is terminal for the feature that produced it only; the
/// pipeline keeps rendering whatever does not depend on the failed piece.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("no price data available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("failed to load model from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("prediction features are disabled: {0}")]
    ModelUnavailable(String),

    #[error("scaler error: {0}")]
    Scaler(#[from] ScalerError),

    #[error("not enough history: need {needed} prices, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("forecast horizon must be a positive number of days")]
    InvalidHorizon,

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error("prediction failed: {0}")]
    Prediction(#[from] anyhow::Error),
}

impl DashboardError {
    pub fn data_unavailable(symbol: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for input problems the caller can fix (bad horizon, bad series).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidHorizon | Self::InvalidSeries(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DashboardError::data_unavailable("GOOG", "empty result");
        assert_eq!(err.to_string(), "no price data available for GOOG: empty result");

        let err = DashboardError::model_load("/tmp/model.json", "missing");
        assert_eq!(err.to_string(), "failed to load model from /tmp/model.json: missing");

        let err = DashboardError::InsufficientHistory { needed: 100, available: 42 };
        assert_eq!(err.to_string(), "not enough history: need 100 prices, have 42");
    }

    #[test]
    fn test_scaler_error_converts() {
        let err: DashboardError = ScalerError::DegenerateRange { value: 5.0 }.into();
        assert!(matches!(err, DashboardError::Scaler(_)));
        assert!(!err.is_validation());
        assert!(DashboardError::InvalidHorizon.is_validation());
    }
}
