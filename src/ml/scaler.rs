use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScalerError {
    #[error("cannot fit scaler on an empty price window")]
    Empty,
    #[error("price window contains a non-finite value")]
    NonFinite,
    #[error("price window is constant at {value}; min-max scaling is undefined")]
    DegenerateRange { value: f64 },
}

/// Min-max normalizer mapping the fitted window onto [0, 1].
///
/// State is fixed once fitted. Values outside the fitted range map outside
/// [0, 1]; the inverse map is exact for any input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn fit(prices: &[f64]) -> Result<Self, ScalerError> {
        if prices.is_empty() {
            return Err(ScalerError::Empty);
        }
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(ScalerError::NonFinite);
        }

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == min {
            return Err(ScalerError::DegenerateRange { value: min });
        }

        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn transform_one(&self, price: f64) -> f64 {
        (price - self.min) / (self.max - self.min)
    }

    pub fn inverse_one(&self, scaled: f64) -> f64 {
        scaled * (self.max - self.min) + self.min
    }

    pub fn transform(&self, prices: &[f64]) -> Vec<f64> {
        prices.iter().map(|&p| self.transform_one(p)).collect()
    }

    pub fn inverse_transform(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&s| self.inverse_one(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let scaler = MinMaxScaler::fit(&[10.0, 15.0, 12.5]).unwrap();
        assert_eq!(scaler.min(), 10.0);
        assert_eq!(scaler.max(), 15.0);
        assert_eq!(scaler.transform(&[10.0, 12.5, 15.0]), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let prices = vec![101.37, 99.12, 250.5, 180.01, 175.333, 99.12];
        let scaler = MinMaxScaler::fit(&prices).unwrap();
        let restored = scaler.inverse_transform(&scaler.transform(&prices));

        for (original, back) in prices.iter().zip(restored.iter()) {
            assert!((original - back).abs() < 1e-9, "{} != {}", original, back);
        }
    }

    #[test]
    fn test_values_outside_fitted_range() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0]).unwrap();
        assert_eq!(scaler.transform_one(25.0), 1.5);
        assert_eq!(scaler.inverse_one(-0.5), 5.0);
    }

    #[test]
    fn test_fit_errors() {
        assert_eq!(MinMaxScaler::fit(&[]), Err(ScalerError::Empty));
        assert_eq!(MinMaxScaler::fit(&[1.0, f64::NAN]), Err(ScalerError::NonFinite));
        assert_eq!(
            MinMaxScaler::fit(&[7.0, 7.0, 7.0]),
            Err(ScalerError::DegenerateRange { value: 7.0 })
        );
    }
}
