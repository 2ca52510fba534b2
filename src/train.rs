//! Mini-batch training loops for the convolutional models.
//!
//! Adam with seeded shuffling, an optional held-out validation split, and
//! Keras-style early stopping (`monitor='val_loss'`, best weights
//! restored). Two loops: categorical cross-entropy for the plain /
//! ensemble network, per-class binary cross-entropy for the DUQ variant.
use anyhow::{ensure, Result};
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{activation::softmax, ElementConversion, Int, Tensor, TensorData};
use ndarray::{Array2, Array3, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::models::{ShallowConvNet, ShallowConvNetConfig, ShallowConvNetDuq};

/// Training hyperparameters. Defaults: Adam at 1e-3, batches of 64,
/// 10 % validation split with patience 10.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of the training set held out for validation-loss
    /// monitoring. Zero disables validation and early stopping.
    pub valid_fraction: f64,
    /// Early-stopping patience in epochs; `None` trains to `epochs`.
    pub patience: Option<usize>,
    /// Optional L2 weight decay (the DUQ script's explicit
    /// regularization).
    pub weight_decay: Option<f64>,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 64,
            learning_rate: 1e-3,
            valid_fraction: 0.1,
            patience: Some(10),
            weight_decay: None,
            seed: 42,
        }
    }
}

/// What a fit actually did, for the drivers' console reports.
#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    pub epochs_run: usize,
    pub best_valid_loss: Option<f32>,
}

// ── Tensor bridging ──────────────────────────────────────────────────────

/// Trials `[N, C, T]` → network input `[N, 1, C, T]`.
pub fn input_tensor<B: Backend>(x: &Array3<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (n, c, t) = x.dim();
    let flat: Vec<f32> = x.iter().copied().collect();
    Tensor::from_data(TensorData::new(flat, [n, 1, c, t]), device)
}

/// Class indices → Int target tensor `[N]`.
pub fn target_tensor<B: Backend>(y: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let ints: Vec<i64> = y.iter().map(|&v| v as i64).collect();
    Tensor::from_data(TensorData::new(ints, [y.len()]), device)
}

/// One-hot matrix `[N, K]` → float target tensor.
pub fn one_hot_tensor<B: Backend>(oh: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (n, k) = oh.dim();
    let flat: Vec<f32> = oh.iter().copied().collect();
    Tensor::from_data(TensorData::new(flat, [n, k]), device)
}

fn gather_trials(x: &Array3<f32>, idx: &[usize]) -> Array3<f32> {
    let views: Vec<_> = idx.iter().map(|&i| x.index_axis(Axis(0), i)).collect();
    ndarray::stack(Axis(0), &views).expect("consistent trial shapes")
}

fn tensor_to_array2<B: Backend>(t: Tensor<B, 2>) -> Array2<f32> {
    let [n, k] = t.dims();
    let flat: Vec<f32> = t.into_data().iter::<f32>().collect();
    Array2::from_shape_vec((n, k), flat).expect("shape matches tensor dims")
}

// ── Early stopping ───────────────────────────────────────────────────────

struct EarlyStopping {
    patience: usize,
    best: f32,
    since_best: usize,
}

impl EarlyStopping {
    fn new(patience: usize) -> Self {
        Self { patience, best: f32::INFINITY, since_best: 0 }
    }

    /// Returns `(improved, stop)` for this epoch's validation loss.
    fn observe(&mut self, loss: f32) -> (bool, bool) {
        if loss < self.best {
            self.best = loss;
            self.since_best = 0;
            (true, false)
        } else {
            self.since_best += 1;
            (false, self.since_best >= self.patience)
        }
    }
}

/// Split `0..n` into (fit, valid) index sets for loss monitoring.
fn valid_split(n: usize, valid_fraction: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    let n_valid = ((n as f64) * valid_fraction).round() as usize;
    // Keep at least one trial on each side when a split was requested.
    let n_valid = if valid_fraction > 0.0 && n >= 2 {
        n_valid.clamp(1, n - 1)
    } else {
        0
    };
    let valid = idx.split_off(n - n_valid);
    (idx, valid)
}

// ── Fit loops ────────────────────────────────────────────────────────────

/// Train a plain Shallow ConvNet with categorical cross-entropy.
///
/// `y` must already be encoded as class indices in `0..n_classes`.
/// Returns the trained model with the best-validation-loss weights
/// restored (when a validation split is configured).
pub fn fit_scn<B: AutodiffBackend>(
    model_cfg: &ShallowConvNetConfig,
    x: &Array3<f32>,
    y: &[usize],
    cfg: &TrainConfig,
    device: &B::Device,
) -> Result<(ShallowConvNet<B>, FitReport)> {
    ensure!(x.shape()[0] == y.len(), "trial/label count mismatch");
    let mut model = model_cfg.init::<B>(device);
    let mut optim = adam(cfg).init();

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let (fit_idx, valid_idx) = valid_split(x.shape()[0], cfg.valid_fraction, &mut rng);

    let mut stopper = cfg.patience.map(EarlyStopping::new);
    let mut best_model = model.clone();
    let mut best_valid = None;
    let mut epochs_run = 0;

    for _epoch in 0..cfg.epochs {
        epochs_run += 1;
        let mut order = fit_idx.clone();
        order.shuffle(&mut rng);

        for batch in order.chunks(cfg.batch_size) {
            let bx = input_tensor::<B>(&gather_trials(x, batch), device);
            let by_vec: Vec<usize> = batch.iter().map(|&i| y[i]).collect();
            let by = target_tensor::<B>(&by_vec, device);

            let logits = model.forward(bx);
            let loss = CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits, by);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.learning_rate, model, grads);
        }

        if valid_idx.is_empty() {
            best_model = model.clone();
            continue;
        }

        // Validation loss on the inner (inference) backend.
        let vx = input_tensor::<B::InnerBackend>(&gather_trials(x, &valid_idx), device);
        let vy_vec: Vec<usize> = valid_idx.iter().map(|&i| y[i]).collect();
        let vy = target_tensor::<B::InnerBackend>(&vy_vec, device);
        let valid_model = model.valid();
        let logits = valid_model.forward(vx);
        let vloss: f32 = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, vy)
            .into_scalar()
            .elem();

        if let Some(stopper) = stopper.as_mut() {
            let (improved, stop) = stopper.observe(vloss);
            if improved {
                best_model = model.clone();
                best_valid = Some(vloss);
            }
            if stop {
                break;
            }
        } else {
            best_model = model.clone();
            best_valid = Some(vloss);
        }
    }

    Ok((best_model, FitReport { epochs_run, best_valid_loss: best_valid }))
}

/// Train the DUQ variant with per-class binary cross-entropy against
/// one-hot targets.
pub fn fit_duq<B: AutodiffBackend>(
    model_cfg: &ShallowConvNetConfig,
    length_scale: f64,
    x: &Array3<f32>,
    y_one_hot: &Array2<f32>,
    cfg: &TrainConfig,
    device: &B::Device,
) -> Result<(ShallowConvNetDuq<B>, FitReport)> {
    ensure!(x.shape()[0] == y_one_hot.shape()[0], "trial/label count mismatch");
    let mut model = ShallowConvNetDuq::<B>::new(model_cfg, length_scale, device);
    let mut optim = adam(cfg).init();

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let (fit_idx, valid_idx) = valid_split(x.shape()[0], cfg.valid_fraction, &mut rng);

    let mut stopper = cfg.patience.map(EarlyStopping::new);
    let mut best_model = model.clone();
    let mut best_valid = None;
    let mut epochs_run = 0;

    for _epoch in 0..cfg.epochs {
        epochs_run += 1;
        let mut order = fit_idx.clone();
        order.shuffle(&mut rng);

        for batch in order.chunks(cfg.batch_size) {
            let bx = input_tensor::<B>(&gather_trials(x, batch), device);
            let bt = one_hot_tensor::<B>(&gather_rows(y_one_hot, batch), device);

            let preds = model.forward(bx);
            let loss = binary_cross_entropy(preds, bt);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.learning_rate, model, grads);
        }

        if valid_idx.is_empty() {
            best_model = model.clone();
            continue;
        }

        let vx = input_tensor::<B::InnerBackend>(&gather_trials(x, &valid_idx), device);
        let vt = one_hot_tensor::<B::InnerBackend>(&gather_rows(y_one_hot, &valid_idx), device);
        let valid_model = model.valid();
        let vloss: f32 = binary_cross_entropy(valid_model.forward(vx), vt)
            .into_scalar()
            .elem();

        if let Some(stopper) = stopper.as_mut() {
            let (improved, stop) = stopper.observe(vloss);
            if improved {
                best_model = model.clone();
                best_valid = Some(vloss);
            }
            if stop {
                break;
            }
        } else {
            best_model = model.clone();
            best_valid = Some(vloss);
        }
    }

    Ok((best_model, FitReport { epochs_run, best_valid_loss: best_valid }))
}

fn adam(cfg: &TrainConfig) -> AdamConfig {
    let adam = AdamConfig::new();
    match cfg.weight_decay {
        Some(wd) => adam.with_weight_decay(Some(WeightDecayConfig::new(wd as f32))),
        None => adam,
    }
}

/// Elementwise binary cross-entropy, mean over batch and classes.
/// `preds` must already be probabilities (the RBF head's outputs are).
fn binary_cross_entropy<B: Backend>(preds: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let p = preds.clamp(1e-7, 1.0 - 1e-7);
    let pos = targets.clone() * p.clone().log();
    let neg = (targets.ones_like() - targets) * (p.ones_like() - p).log();
    (pos + neg).mean().neg()
}

fn gather_rows(m: &Array2<f32>, idx: &[usize]) -> Array2<f32> {
    let views: Vec<_> = idx.iter().map(|&i| m.index_axis(Axis(0), i)).collect();
    ndarray::stack(Axis(0), &views).expect("consistent row shapes")
}

// ── Inference ────────────────────────────────────────────────────────────

/// Softmax class probabilities of a trained plain network, `[N, K]`.
pub fn predict_proba<B: Backend>(
    model: &ShallowConvNet<B>,
    x: &Array3<f32>,
    batch_size: usize,
    device: &B::Device,
) -> Array2<f32> {
    let n = x.shape()[0];
    let idx: Vec<usize> = (0..n).collect();
    let mut rows = Vec::new();
    for batch in idx.chunks(batch_size) {
        let bx = input_tensor::<B>(&gather_trials(x, batch), device);
        let probs = softmax(model.forward(bx), 1);
        rows.push(tensor_to_array2(probs));
    }
    concat_rows(&rows)
}

/// Raw RBF kernel similarities of a trained DUQ network, `[N, K]`.
pub fn predict_kernel<B: Backend>(
    model: &ShallowConvNetDuq<B>,
    x: &Array3<f32>,
    batch_size: usize,
    device: &B::Device,
) -> Array2<f32> {
    let n = x.shape()[0];
    let idx: Vec<usize> = (0..n).collect();
    let mut rows = Vec::new();
    for batch in idx.chunks(batch_size) {
        let bx = input_tensor::<B>(&gather_trials(x, batch), device);
        rows.push(tensor_to_array2(model.forward(bx)));
    }
    concat_rows(&rows)
}

fn concat_rows(parts: &[Array2<f32>]) -> Array2<f32> {
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    ndarray::concatenate(Axis(0), &views).expect("consistent column counts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_stopping_counts_and_restores() {
        let mut es = EarlyStopping::new(2);
        assert_eq!(es.observe(1.0), (true, false));
        assert_eq!(es.observe(0.8), (true, false));
        assert_eq!(es.observe(0.9), (false, false));
        assert_eq!(es.observe(0.85), (false, true));
        approx::assert_abs_diff_eq!(es.best, 0.8_f32);
    }

    #[test]
    fn valid_split_is_disjoint_and_covers() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let (fit, valid) = valid_split(20, 0.1, &mut rng);
        assert_eq!(fit.len() + valid.len(), 20);
        assert_eq!(valid.len(), 2);
        for v in &valid {
            assert!(!fit.contains(v));
        }
    }

    #[test]
    fn zero_fraction_disables_validation() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let (fit, valid) = valid_split(10, 0.0, &mut rng);
        assert_eq!(fit.len(), 10);
        assert!(valid.is_empty());
    }
}
