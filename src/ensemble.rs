//! Deep Ensembles: uncertainty from independently trained copies.
//!
//! Each member is a plain Shallow ConvNet trained from its own random
//! initialization and data ordering; the per-member probability vectors
//! are averaged into one calibrated distribution per trial, and the
//! predictive entropy of that average is the uncertainty score.
use anyhow::{ensure, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use ndarray::{Array1, Array2, Array3, Axis};

use crate::models::{ShallowConvNet, ShallowConvNetConfig};
use crate::train::{fit_scn, predict_proba, FitReport, TrainConfig};

/// A trained ensemble over the inference backend of `B`.
pub struct DeepEnsemble<B: AutodiffBackend> {
    members: Vec<ShallowConvNet<B::InnerBackend>>,
}

impl<B: AutodiffBackend> DeepEnsemble<B> {
    /// Train `n_members` independently initialized copies. Member `m`
    /// trains with seed `cfg.seed + m` so runs are reproducible but the
    /// members differ in both initialization and batch order.
    pub fn fit(
        model_cfg: &ShallowConvNetConfig,
        n_members: usize,
        x: &Array3<f32>,
        y: &[usize],
        cfg: &TrainConfig,
        device: &B::Device,
    ) -> Result<(Self, Vec<FitReport>)> {
        ensure!(n_members >= 1, "an ensemble needs at least one member");
        let mut members = Vec::with_capacity(n_members);
        let mut reports = Vec::with_capacity(n_members);
        for m in 0..n_members {
            let member_cfg = TrainConfig { seed: cfg.seed + m as u64, ..cfg.clone() };
            let (model, report) = fit_scn::<B>(model_cfg, x, y, &member_cfg, device)?;
            members.push(model.valid());
            reports.push(report);
        }
        Ok((Self { members }, reports))
    }

    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// Stack of per-member probability matrices, `[M, N, K]`.
    pub fn member_probabilities(
        &self,
        x: &Array3<f32>,
        batch_size: usize,
        device: &<B::InnerBackend as burn::tensor::backend::Backend>::Device,
    ) -> Array3<f32> {
        let mats: Vec<Array2<f32>> = self
            .members
            .iter()
            .map(|m| predict_proba(m, x, batch_size, device))
            .collect();
        let views: Vec<_> = mats.iter().map(|m| m.view()).collect();
        ndarray::stack(Axis(0), &views).expect("consistent member output shapes")
    }

    /// Ensemble-averaged probabilities, `[N, K]`.
    pub fn predict_proba(
        &self,
        x: &Array3<f32>,
        batch_size: usize,
        device: &<B::InnerBackend as burn::tensor::backend::Backend>::Device,
    ) -> Array2<f32> {
        average_probabilities(&self.member_probabilities(x, batch_size, device))
    }
}

/// Collapse a `[M, N, K]` stack of member probabilities by averaging
/// over members. Averaging `M` identical matrices reproduces the matrix.
pub fn average_probabilities(stack: &Array3<f32>) -> Array2<f32> {
    stack.mean_axis(Axis(0)).expect("non-empty member stack")
}

/// Predictive entropy `−Σ p ln p` per trial (nats). Zero for a one-hot
/// row, `ln K` for a uniform row.
pub fn predictive_entropy(probs: &Array2<f32>) -> Array1<f32> {
    probs.map_axis(Axis(1), |row| {
        -row.iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| p * p.ln())
            .sum::<f32>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn averaging_identical_members_is_idempotent() {
        let member = array![[0.7_f32, 0.3], [0.2, 0.8]];
        let stack = ndarray::stack(
            Axis(0),
            &[member.view(), member.view(), member.view()],
        )
        .unwrap();
        let avg = average_probabilities(&stack);
        assert_eq!(avg, member);
    }

    #[test]
    fn single_member_stack_is_the_member() {
        let member = array![[0.55_f32, 0.45]];
        let stack = ndarray::stack(Axis(0), &[member.view()]).unwrap();
        assert_eq!(average_probabilities(&stack), member);
    }

    #[test]
    fn entropy_bounds() {
        let probs = array![[1.0_f32, 0.0, 0.0], [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]];
        let h = predictive_entropy(&probs);
        approx::assert_abs_diff_eq!(h[0], 0.0, epsilon = 1e-6_f32);
        approx::assert_abs_diff_eq!(h[1], 3.0_f32.ln(), epsilon = 1e-5_f32);
    }

    #[test]
    fn disagreement_raises_entropy_of_the_average() {
        let a = array![[1.0_f32, 0.0]];
        let b = array![[0.0_f32, 1.0]];
        let stack = ndarray::stack(Axis(0), &[a.view(), b.view()]).unwrap();
        let avg = average_probabilities(&stack);
        let h = predictive_entropy(&avg);
        approx::assert_abs_diff_eq!(h[0], 2.0_f32.ln(), epsilon = 1e-6_f32);
    }
}
