use anyhow::{anyhow, Result};

/// Sequence-to-one regressor over normalized prices.
///
/// `predict` must not change model state; only `fit_one_step` mutates it.
#[cfg_attr(test, mockall::automock)]
pub trait Predictor: Send + Sync {
    /// Model name for logs and the session summary
    fn name(&self) -> &'static str;

    /// Window length the model was trained on
    fn window_len(&self) -> usize;

    /// One output per input window, in batch order
    fn predict(&self, windows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Single incremental training step on one (window, target) pair
    fn fit_one_step(&mut self, window: &[f64], target: f64) -> Result<()>;
}

/// Convenience wrapper for a batch of one.
pub fn predict_one(predictor: &dyn Predictor, window: &[f64]) -> Result<f64> {
    let batch = [window.to_vec()];
    predictor
        .predict(&batch)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{} returned no prediction", predictor.name()))
}
