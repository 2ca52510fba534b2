//! Per-trial covariance estimation.
//!
//! Reduces each EEG trial ([C, T]) to a channel-by-channel covariance
//! matrix. The Ledoit-Wolf estimator shrinks the sample covariance
//! toward a scaled identity, which keeps the estimate well-conditioned
//! and positive definite even when T is small relative to C.
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use ndarray::{Array3, ArrayView2};

use crate::spd::is_spd;

/// Covariance estimator choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovEstimator {
    /// Plain sample covariance `X Xᵀ / T` (rows centered).
    Sample,
    /// Ledoit-Wolf shrinkage toward `μ·I` (Ledoit & Wolf 2004).
    LedoitWolf,
}

/// Estimate one covariance matrix per trial.
///
/// `trials`: [N, C, T]. Returns N matrices of shape [C, C]. Every output
/// is checked for positive-definiteness; a degenerate estimate (e.g. from
/// a constant trial) is an error rather than a silently singular matrix.
pub fn covariances(
    trials: &Array3<f32>,
    estimator: CovEstimator,
) -> Result<Vec<DMatrix<f64>>> {
    let n = trials.shape()[0];
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let cov = trial_covariance(trials.index_axis(ndarray::Axis(0), i), estimator);
        if !is_spd(&cov, 1e-12) {
            bail!("covariance of trial {i} is not positive definite");
        }
        out.push(cov);
    }
    Ok(out)
}

/// Covariance of a single trial ([C, T]).
pub fn trial_covariance(trial: ArrayView2<f32>, estimator: CovEstimator) -> DMatrix<f64> {
    let (n_ch, n_t) = trial.dim();

    // Center each channel over time (f64 accumulation).
    let mut x = DMatrix::<f64>::from_fn(n_ch, n_t, |c, t| trial[[c, t]] as f64);
    for c in 0..n_ch {
        let mean: f64 = x.row(c).iter().sum::<f64>() / n_t as f64;
        x.row_mut(c).iter_mut().for_each(|v| *v -= mean);
    }

    let s = &x * x.transpose() / n_t as f64;
    match estimator {
        CovEstimator::Sample => s,
        CovEstimator::LedoitWolf => ledoit_wolf(&x, &s),
    }
}

/// Ledoit-Wolf shrinkage of the sample covariance `s` of the centered
/// data `x` ([C, T], observations in columns).
///
/// Shrinkage target is `μ·I` with `μ = tr(S)/C`; the shrinkage intensity
/// `b²/d²` follows the normalized-Frobenius estimators of Ledoit & Wolf
/// (2004), clipped so the result interpolates between S and μ·I.
fn ledoit_wolf(x: &DMatrix<f64>, s: &DMatrix<f64>) -> DMatrix<f64> {
    let c = s.nrows();
    let t = x.ncols();
    let cf = c as f64;
    let tf = t as f64;

    let mu = s.trace() / cf;
    let target = DMatrix::<f64>::identity(c, c) * mu;

    // d² = ‖S − μI‖²_F / C
    let d2 = (s - &target).norm_squared() / cf;

    // b̄² = (1/T²) Σ_t ‖x_t x_tᵀ − S‖²_F / C
    let mut b2_bar = 0.0;
    for k in 0..t {
        let col = x.column(k);
        let outer = &col * col.transpose();
        b2_bar += (&outer - s).norm_squared() / cf;
    }
    b2_bar /= tf * tf;

    let b2 = b2_bar.min(d2);
    if d2 <= 0.0 {
        // Zero-variance data: the target is the only sensible estimate.
        return target;
    }
    let a2 = d2 - b2;
    &target * (b2 / d2) + s * (a2 / d2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn noise_trials(n: usize, c: usize, t: usize, seed: u64) -> Array3<f32> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(0.0_f32, 1.0).unwrap();
        Array3::from_shape_fn((n, c, t), |_| normal.sample(&mut rng))
    }

    #[test]
    fn lwf_output_is_spd_and_symmetric() {
        let trials = noise_trials(4, 6, 128, 7);
        let covs = covariances(&trials, CovEstimator::LedoitWolf).unwrap();
        assert_eq!(covs.len(), 4);
        for cov in &covs {
            assert!(is_spd(cov, 1e-12));
            let asym = (cov - cov.transpose()).norm();
            approx::assert_abs_diff_eq!(asym, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn lwf_shrinks_toward_scaled_identity() {
        // Very short trials: shrinkage must pull off-diagonals toward 0
        // relative to the raw sample covariance.
        let trials = noise_trials(1, 8, 12, 3);
        let view = trials.index_axis(ndarray::Axis(0), 0);
        let raw = trial_covariance(view, CovEstimator::Sample);
        let lwf = trial_covariance(view, CovEstimator::LedoitWolf);

        let off = |m: &DMatrix<f64>| {
            let mut s = 0.0;
            for i in 0..8 {
                for j in 0..8 {
                    if i != j {
                        s += m[(i, j)].abs();
                    }
                }
            }
            s
        };
        assert!(off(&lwf) < off(&raw));
        // Trace (total variance) is preserved by the convex combination.
        approx::assert_abs_diff_eq!(lwf.trace(), raw.trace(), epsilon = 1e-9);
    }

    #[test]
    fn constant_trial_is_rejected() {
        let trials = Array3::from_elem((1, 4, 64), 1.0_f32);
        assert!(covariances(&trials, CovEstimator::LedoitWolf).is_err());
    }

    #[test]
    fn sample_covariance_of_known_signal() {
        // Two perfectly correlated channels.
        let mut trials = Array3::zeros((1, 2, 100));
        for t in 0..100 {
            let v = (t as f32 * 0.37).sin();
            trials[[0, 0, t]] = v;
            trials[[0, 1, t]] = 2.0 * v;
        }
        let cov = trial_covariance(
            trials.index_axis(ndarray::Axis(0), 0),
            CovEstimator::Sample,
        );
        // cov[0,1] = 2 var(v), cov[1,1] = 4 var(v).
        approx::assert_abs_diff_eq!(cov[(0, 1)] * 2.0, cov[(1, 1)], epsilon = 1e-9);
        approx::assert_abs_diff_eq!(cov[(0, 1)], 2.0 * cov[(0, 0)], epsilon = 1e-9);
    }
}
