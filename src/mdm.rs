//! Minimum-distance-to-mean (MDM) classifier with an uncertainty score.
//!
//! Fit: one geometric mean per class over that class's training
//! covariances, under a configurable mean metric. Predict: nearest class
//! mean by geodesic distance, under an independently configurable
//! distance metric.
//!
//! On top of the arg-min label, [`Mdm::predict_with_uncertainty`] reports
//! a per-trial confidence derived from the *full* distance vector
//! (inverse distances normalized to sum to one), so downstream
//! calibration can tell a close call between two classes apart from a
//! trial that is far from all means but one.
use anyhow::{bail, ensure, Result};
use nalgebra::DMatrix;
use ndarray::Array2;

use crate::spd;

/// Metric on the SPD manifold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Affine-invariant Riemannian metric.
    #[default]
    Riemann,
    /// Log-Euclidean metric.
    LogEuclid,
}

impl Metric {
    fn distance(&self, a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        match self {
            Metric::Riemann => spd::distance_riemann(a, b),
            Metric::LogEuclid => spd::distance_logeuclid(a, b),
        }
    }

    fn mean(&self, mats: &[DMatrix<f64>], weights: Option<&[f64]>) -> Result<DMatrix<f64>> {
        match self {
            Metric::Riemann => spd::mean_riemann(mats, weights),
            Metric::LogEuclid => spd::mean_logeuclid(mats, weights),
        }
    }
}

/// Independently selectable mean-computation and distance metrics,
/// e.g. mean under log-Euclidean with distances under Riemannian.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricPair {
    pub mean: Metric,
    pub distance: Metric,
}

impl MetricPair {
    /// Same metric for mean and distance.
    pub fn uniform(metric: Metric) -> Self {
        Self { mean: metric, distance: metric }
    }
}

/// Minimum number of training samples per class; fewer would produce a
/// degenerate (or undefined) geometric mean.
pub const MIN_CLASS_SAMPLES: usize = 2;

/// MDM classifier over SPD covariance matrices.
#[derive(Debug, Clone, Default)]
pub struct Mdm {
    metric: MetricPair,
    classes: Vec<String>,
    means: Vec<DMatrix<f64>>,
}

impl Mdm {
    pub fn new(metric: MetricPair) -> Self {
        Self { metric, classes: Vec::new(), means: Vec::new() }
    }

    /// Class labels in encoding order (sorted), available after fit.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Fitted class means, in [`Mdm::classes`] order.
    pub fn means(&self) -> &[DMatrix<f64>] {
        &self.means
    }

    /// Fit one geometric mean per class.
    ///
    /// `sample_weight` (optional, one weight per trial) is applied inside
    /// each class's mean computation, e.g. balanced weights to counter
    /// class imbalance.
    ///
    /// Fails fast when a class has fewer than [`MIN_CLASS_SAMPLES`]
    /// trials or when any input matrix is not positive definite.
    pub fn fit(
        &mut self,
        covs: &[DMatrix<f64>],
        y: &[String],
        sample_weight: Option<&[f64]>,
    ) -> Result<()> {
        ensure!(covs.len() == y.len(), "got {} covariances but {} labels", covs.len(), y.len());
        ensure!(!covs.is_empty(), "cannot fit on an empty training set");
        if let Some(w) = sample_weight {
            ensure!(w.len() == y.len(), "got {} labels but {} sample weights", y.len(), w.len());
        }
        for (i, cov) in covs.iter().enumerate() {
            if !spd::is_spd(cov, 1e-12) {
                bail!("training covariance {i} is not positive definite");
            }
        }

        let mut classes: Vec<String> = y.to_vec();
        classes.sort();
        classes.dedup();

        let mut means = Vec::with_capacity(classes.len());
        for class in &classes {
            let idx: Vec<usize> = (0..y.len()).filter(|&i| &y[i] == class).collect();
            ensure!(
                idx.len() >= MIN_CLASS_SAMPLES,
                "class '{class}' has {} samples, need at least {MIN_CLASS_SAMPLES}",
                idx.len()
            );
            let class_covs: Vec<DMatrix<f64>> = idx.iter().map(|&i| covs[i].clone()).collect();
            let class_w: Option<Vec<f64>> =
                sample_weight.map(|w| idx.iter().map(|&i| w[i]).collect());
            means.push(self.metric.mean.mean(&class_covs, class_w.as_deref())?);
        }

        self.classes = classes;
        self.means = means;
        Ok(())
    }

    fn check_fitted(&self) -> Result<()> {
        ensure!(!self.means.is_empty(), "MDM has not been fitted");
        Ok(())
    }

    /// Geodesic distances to every class mean: [N, K].
    pub fn transform(&self, covs: &[DMatrix<f64>]) -> Result<Array2<f64>> {
        self.check_fitted()?;
        for (i, cov) in covs.iter().enumerate() {
            if !spd::is_spd(cov, 1e-12) {
                bail!("query covariance {i} is not positive definite");
            }
        }
        let mut d = Array2::zeros((covs.len(), self.means.len()));
        for (i, cov) in covs.iter().enumerate() {
            for (k, mean) in self.means.iter().enumerate() {
                d[[i, k]] = self.metric.distance.distance(cov, mean);
            }
        }
        Ok(d)
    }

    /// Nearest class mean per trial.
    pub fn predict(&self, covs: &[DMatrix<f64>]) -> Result<Vec<String>> {
        let d = self.transform(covs)?;
        Ok(d.rows()
            .into_iter()
            .map(|row| self.classes[argmin(row.iter())].clone())
            .collect())
    }

    /// Probability-like scores: row softmax of the negated squared
    /// distances. Rows sum to 1.
    pub fn predict_proba(&self, covs: &[DMatrix<f64>]) -> Result<Array2<f64>> {
        let d = self.transform(covs)?;
        let mut proba = d.mapv(|v| -(v * v));
        for mut row in proba.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let s: f64 = row.sum();
            row.mapv_inplace(|v| v / s);
        }
        Ok(proba)
    }

    /// Predicted class plus a normalized uncertainty score per trial.
    ///
    /// The inverse distances `1/d_k` are normalized to sum to one; the
    /// top value is the confidence of the arg-min class and the returned
    /// uncertainty is its complement, so both live in [0, 1].
    pub fn predict_with_uncertainty(
        &self,
        covs: &[DMatrix<f64>],
    ) -> Result<(Vec<String>, Vec<f64>)> {
        let d = self.transform(covs)?;
        let mut labels = Vec::with_capacity(covs.len());
        let mut uncertainty = Vec::with_capacity(covs.len());

        for row in d.rows() {
            let best = argmin(row.iter());
            labels.push(self.classes[best].clone());

            // A zero distance means the query *is* a class mean: full
            // confidence in that class.
            let confidence = if row[best] == 0.0 {
                1.0
            } else {
                let inv: Vec<f64> = row.iter().map(|&v| 1.0 / v).collect();
                let s: f64 = inv.iter().sum();
                inv[best] / s
            };
            uncertainty.push(1.0 - confidence);
        }
        Ok((labels, uncertainty))
    }
}

fn argmin<'a>(values: impl Iterator<Item = &'a f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::INFINITY;
    for (i, &v) in values.enumerate() {
        if v < best_val {
            best = i;
            best_val = v;
        }
    }
    best
}
