use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::Predictor;

/// Hyper-parameters stored alongside the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmConfig {
    /// Input window the model was trained on
    pub window: usize,
    pub hidden_size: usize,
    /// SGD step size used by `fit_one_step`
    pub learning_rate: f64,
    /// Global-norm gradient clipping threshold
    pub gradient_clip: Option<f64>,
}

impl LstmConfig {
    pub fn new(window: usize, hidden_size: usize) -> Self {
        Self {
            window,
            hidden_size,
            learning_rate: 0.001,
            gradient_clip: Some(1.0),
        }
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_gradient_clip(mut self, clip: Option<f64>) -> Self {
        self.gradient_clip = clip;
        self
    }
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self::new(100, 32)
    }
}

/// Weights of one LSTM gate for a univariate input.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Gate {
    /// input -> gate [hidden]
    w: Array1<f64>,
    /// hidden -> gate [hidden, hidden]
    u: Array2<f64>,
    b: Array1<f64>,
}

impl Gate {
    fn random(hidden: usize, limit: f64, bias: f64, rng: &mut StdRng) -> Self {
        Self {
            w: Array1::from_shape_fn(hidden, |_| rng.random_range(-limit..limit)),
            u: Array2::from_shape_fn((hidden, hidden), |_| rng.random_range(-limit..limit)),
            b: Array1::from_elem(hidden, bias),
        }
    }

    fn pre_activation(&self, x: f64, h: &Array1<f64>) -> Array1<f64> {
        &self.w * x + self.u.dot(h) + &self.b
    }

    fn check_shape(&self, name: &str, hidden: usize) -> Result<()> {
        if self.w.len() != hidden || self.b.len() != hidden || self.u.dim() != (hidden, hidden) {
            bail!(
                "{} gate has shapes w={:?} u={:?} b={:?}, expected hidden size {}",
                name,
                self.w.dim(),
                self.u.dim(),
                self.b.dim(),
                hidden
            );
        }
        let finite = self.w.iter().chain(self.u.iter()).chain(self.b.iter()).all(|v| v.is_finite());
        if !finite {
            bail!("{} gate contains non-finite weights", name);
        }
        Ok(())
    }

    fn apply(&mut self, grad: &GateGrad, lr: f64) {
        self.w.scaled_add(-lr, &grad.w);
        self.u.scaled_add(-lr, &grad.u);
        self.b.scaled_add(-lr, &grad.b);
    }
}

#[derive(Debug, Clone)]
struct GateGrad {
    w: Array1<f64>,
    u: Array2<f64>,
    b: Array1<f64>,
}

impl GateGrad {
    fn zeros(hidden: usize) -> Self {
        Self {
            w: Array1::zeros(hidden),
            u: Array2::zeros((hidden, hidden)),
            b: Array1::zeros(hidden),
        }
    }

    fn accumulate(&mut self, dz: &Array1<f64>, x: f64, h_prev: &Array1<f64>) {
        self.w.scaled_add(x, dz);
        let outer = dz
            .view()
            .insert_axis(Axis(1))
            .dot(&h_prev.view().insert_axis(Axis(0)));
        self.u += &outer;
        self.b += dz;
    }

    fn squared_norm(&self) -> f64 {
        self.w.iter().chain(self.u.iter()).chain(self.b.iter()).map(|v| v * v).sum()
    }

    fn scale(&mut self, factor: f64) {
        self.w *= factor;
        self.u *= factor;
        self.b *= factor;
    }
}

/// Cached activations of one time step, needed for back-propagation.
struct Step {
    x: f64,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
}

struct Forward {
    output: f64,
    h_last: Array1<f64>,
    steps: Vec<Step>,
}

struct Gradients {
    input: GateGrad,
    forget: GateGrad,
    cell: GateGrad,
    output: GateGrad,
    head_w: Array1<f64>,
    head_b: f64,
}

impl Gradients {
    fn global_norm(&self) -> f64 {
        let gates = self.input.squared_norm()
            + self.forget.squared_norm()
            + self.cell.squared_norm()
            + self.output.squared_norm();
        let head = self.head_w.iter().map(|v| v * v).sum::<f64>() + self.head_b * self.head_b;
        (gates + head).sqrt()
    }

    fn scale(&mut self, factor: f64) {
        self.input.scale(factor);
        self.forget.scale(factor);
        self.cell.scale(factor);
        self.output.scale(factor);
        self.head_w *= factor;
        self.head_b *= factor;
    }
}

/// Single-layer LSTM over a window of normalized prices with a linear head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmPredictor {
    pub config: LstmConfig,
    input: Gate,
    forget: Gate,
    cell: Gate,
    output: Gate,
    head_w: Array1<f64>,
    head_b: f64,
}

impl LstmPredictor {
    /// Untrained model with uniform(-1/sqrt(h), 1/sqrt(h)) weights from a seeded RNG.
    pub fn new(config: LstmConfig, seed: u64) -> Self {
        let hidden = config.hidden_size;
        let limit = (1.0 / hidden.max(1) as f64).sqrt();
        let mut rng = StdRng::seed_from_u64(seed);

        let input = Gate::random(hidden, limit, 0.0, &mut rng);
        // Forget bias starts at 1 so early steps keep their memory
        let forget = Gate::random(hidden, limit, 1.0, &mut rng);
        let cell = Gate::random(hidden, limit, 0.0, &mut rng);
        let output = Gate::random(hidden, limit, 0.0, &mut rng);
        let head_w = Array1::from_shape_fn(hidden, |_| rng.random_range(-limit..limit));

        Self {
            config,
            input,
            forget,
            cell,
            output,
            head_w,
            head_b: 0.0,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read model file {}", path.display()))?;
        let model: Self = serde_json::from_str(&json)
            .with_context(|| format!("model file {} is not a valid LSTM model", path.display()))?;
        model.validate()?;

        info!(
            "Loaded LSTM model from {} (window={}, hidden={})",
            path.display(),
            model.config.window,
            model.config.hidden_size
        );
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved LSTM model to {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let hidden = self.config.hidden_size;
        if self.config.window == 0 || hidden == 0 {
            bail!("window and hidden_size must be positive");
        }
        if !self.config.learning_rate.is_finite() || self.config.learning_rate < 0.0 {
            bail!("learning_rate must be a non-negative number");
        }
        self.input.check_shape("input", hidden)?;
        self.forget.check_shape("forget", hidden)?;
        self.cell.check_shape("cell", hidden)?;
        self.output.check_shape("output", hidden)?;
        if self.head_w.len() != hidden || !self.head_b.is_finite() {
            bail!("output head expects {} weights, found {}", hidden, self.head_w.len());
        }
        Ok(())
    }

    fn forward(&self, window: &[f64]) -> Forward {
        let hidden = self.config.hidden_size;
        let mut h: Array1<f64> = Array1::zeros(hidden);
        let mut c: Array1<f64> = Array1::zeros(hidden);
        let mut steps = Vec::with_capacity(window.len());

        for &x in window {
            let i = sigmoid(&self.input.pre_activation(x, &h));
            let f = sigmoid(&self.forget.pre_activation(x, &h));
            let g = self.cell.pre_activation(x, &h).mapv(f64::tanh);
            let o = sigmoid(&self.output.pre_activation(x, &h));

            let c_next = &f * &c + &i * &g;
            let h_next = &o * &c_next.mapv(f64::tanh);

            steps.push(Step {
                x,
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                c: c_next.clone(),
            });
            h = h_next;
            c = c_next;
        }

        let output = self.head_w.dot(&h) + self.head_b;
        Forward { output, h_last: h, steps }
    }

    /// Back-propagation through time for squared error on one example.
    fn gradients(&self, fwd: &Forward, target: f64) -> Gradients {
        let hidden = self.config.hidden_size;
        let dy = 2.0 * (fwd.output - target);

        let mut grads = Gradients {
            input: GateGrad::zeros(hidden),
            forget: GateGrad::zeros(hidden),
            cell: GateGrad::zeros(hidden),
            output: GateGrad::zeros(hidden),
            head_w: &fwd.h_last * dy,
            head_b: dy,
        };

        let mut dh: Array1<f64> = &self.head_w * dy;
        let mut dc: Array1<f64> = Array1::zeros(hidden);

        for step in fwd.steps.iter().rev() {
            let tanh_c = step.c.mapv(f64::tanh);

            let dz_o = &dh * &tanh_c * &step.o.mapv(|v| v * (1.0 - v));
            dc = dc + &dh * &step.o * &tanh_c.mapv(|v| 1.0 - v * v);

            let dz_i = &dc * &step.g * &step.i.mapv(|v| v * (1.0 - v));
            let dz_g = &dc * &step.i * &step.g.mapv(|v| 1.0 - v * v);
            let dz_f = &dc * &step.c_prev * &step.f.mapv(|v| v * (1.0 - v));

            grads.input.accumulate(&dz_i, step.x, &step.h_prev);
            grads.forget.accumulate(&dz_f, step.x, &step.h_prev);
            grads.cell.accumulate(&dz_g, step.x, &step.h_prev);
            grads.output.accumulate(&dz_o, step.x, &step.h_prev);

            dh = self.input.u.t().dot(&dz_i)
                + self.forget.u.t().dot(&dz_f)
                + self.cell.u.t().dot(&dz_g)
                + self.output.u.t().dot(&dz_o);
            dc = &dc * &step.f;
        }

        grads
    }
}

impl Predictor for LstmPredictor {
    fn name(&self) -> &'static str {
        "lstm"
    }

    fn window_len(&self) -> usize {
        self.config.window
    }

    fn predict(&self, windows: &[Vec<f64>]) -> Result<Vec<f64>> {
        windows
            .iter()
            .enumerate()
            .map(|(idx, window)| {
                if window.is_empty() {
                    return Err(anyhow!("window {} is empty", idx));
                }
                Ok(self.forward(window).output)
            })
            .collect()
    }

    fn fit_one_step(&mut self, window: &[f64], target: f64) -> Result<()> {
        if window.is_empty() {
            bail!("cannot fit on an empty window");
        }
        if !target.is_finite() || window.iter().any(|v| !v.is_finite()) {
            bail!("training example contains non-finite values");
        }

        let fwd = self.forward(window);
        let mut grads = self.gradients(&fwd, target);

        let norm = grads.global_norm();
        if let Some(clip) = self.config.gradient_clip {
            if norm > clip && norm > 0.0 {
                grads.scale(clip / norm);
            }
        }

        let lr = self.config.learning_rate;
        self.input.apply(&grads.input, lr);
        self.forget.apply(&grads.forget, lr);
        self.cell.apply(&grads.cell, lr);
        self.output.apply(&grads.output, lr);
        self.head_w.scaled_add(-lr, &grads.head_w);
        self.head_b -= lr * grads.head_b;

        debug!(
            "LSTM step: loss={:.6}, grad_norm={:.6}, lr={}",
            (fwd.output - target).powi(2),
            norm,
            lr
        );
        Ok(())
    }
}

fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}
