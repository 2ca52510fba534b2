//! DUQ variant: Shallow ConvNet with an RBF output layer.
//!
//! The head replaces the softmax with class-conditional kernel
//! similarities `K_c(x) = exp(−‖x − e_c‖² / (2σ²))` against trainable
//! centroids `e_c`, trained with a per-class binary cross-entropy so the
//! output magnitude reflects distance from the training data rather than
//! a normalized probability.
//!
//! At inference the raw similarities go through
//! [`duq_confidence`] (L1-normalize → temperature scale → softmax →
//! max) to produce an interpretable probability and confidence score.
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{Array1, Array2, Axis};

use super::scn::{ScnTrunk, ShallowConvNetConfig};

/// RBF output layer configuration.
#[derive(Config, Debug)]
pub struct RbfOutputConfig {
    pub n_classes: usize,
    pub in_features: usize,
    /// Kernel length scale σ.
    #[config(default = 0.2)]
    pub length_scale: f64,
}

impl RbfOutputConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RbfOutput<B> {
        RbfOutput {
            centroids: Initializer::Normal { mean: 0.0, std: 0.05 }
                .init([self.n_classes, self.in_features], device),
            length_scale: self.length_scale,
        }
    }
}

/// Distance-based ("RBF") classification layer with trainable
/// per-class centroids.
#[derive(Module, Debug)]
pub struct RbfOutput<B: Backend> {
    centroids: Param<Tensor<B, 2>>,
    length_scale: f64,
}

impl<B: Backend> RbfOutput<B> {
    /// `[batch, d]` → kernel similarities `[batch, n_classes]` in (0, 1].
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = x.dims();
        let [k, _] = self.centroids.dims();

        let x = x.unsqueeze_dim::<3>(1); // [b, 1, d]
        let c = self.centroids.val().unsqueeze::<3>(); // [1, k, d]
        let sq_dist = (x - c).powf_scalar(2.0).sum_dim(2).reshape([batch, k]);
        sq_dist
            .mul_scalar(-1.0 / (2.0 * self.length_scale * self.length_scale))
            .exp()
    }
}

/// Shallow ConvNet trunk + dense embedding + RBF output.
#[derive(Module, Debug)]
pub struct ShallowConvNetDuq<B: Backend> {
    trunk: ScnTrunk<B>,
    fc: Linear<B>,
    rbf: RbfOutput<B>,
}

impl<B: Backend> ShallowConvNetDuq<B> {
    pub fn new(cfg: &ShallowConvNetConfig, length_scale: f64, device: &B::Device) -> Self {
        Self {
            trunk: cfg.init_trunk(device),
            fc: LinearConfig::new(cfg.feature_dim(), cfg.n_classes).init(device),
            rbf: RbfOutputConfig::new(cfg.n_classes, cfg.n_classes)
                .with_length_scale(length_scale)
                .init(device),
        }
    }

    /// `[batch, 1, C, T]` → kernel similarities `[batch, n_classes]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.rbf.forward(self.fc.forward(self.trunk.forward(x)))
    }
}

// ── Confidence post-processing ───────────────────────────────────────────
//
// Pure f32 pipeline, bit-for-bit reproducible for fixed inputs.

/// L1-normalize each row (rows of zeros are left untouched).
pub fn l1_normalize_rows(raw: &Array2<f32>) -> Array2<f32> {
    let mut out = raw.clone();
    for mut row in out.rows_mut() {
        let s: f32 = row.iter().map(|v| v.abs()).sum();
        if s > 0.0 {
            row.mapv_inplace(|v| v / s);
        }
    }
    out
}

/// Row softmax of `x / temperature`.
pub fn softmax_rows(x: &Array2<f32>, temperature: f32) -> Array2<f32> {
    let mut out = x.mapv(|v| v / temperature);
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let s: f32 = row.sum();
        row.mapv_inplace(|v| v / s);
    }
    out
}

/// Full DUQ confidence pipeline on raw kernel outputs:
/// L1-normalize → temperature-scale → row softmax → row max.
///
/// Returns `(probabilities [N, K], confidence [N])`. The L1 step is
/// arguably redundant given the softmax but changes the confidences
/// whenever the raw similarities are far from the simplex, so it stays.
pub fn duq_confidence(raw: &Array2<f32>, temperature: f32) -> (Array2<f32>, Array1<f32>) {
    let proba = softmax_rows(&l1_normalize_rows(raw), temperature);
    let confidence = proba.map_axis(Axis(1), |row| {
        row.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
    });
    (proba, confidence)
}
