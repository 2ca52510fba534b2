/// Shared helpers for the classifier pipeline tests.
use miuq::covariance::{covariances, CovEstimator};
use miuq::dataset::{synthetic_trials, TrialData};
use nalgebra::DMatrix;

/// Well-separated synthetic trials: per-class channel gains large enough
/// that covariance structure identifies the class almost perfectly.
#[allow(unused)]
pub fn separable_trials(n_per_class: usize, n_classes: usize, n_chans: usize, n_samples: usize, seed: u64) -> TrialData {
    synthetic_trials(n_per_class, n_classes, n_chans, n_samples, 250.0, 3.0, seed)
}

/// Ledoit-Wolf covariances of a trial set.
#[allow(unused)]
pub fn lwf_covs(data: &TrialData) -> Vec<DMatrix<f64>> {
    covariances(&data.x, CovEstimator::LedoitWolf).expect("synthetic trials are never degenerate")
}

/// Fraction of label matches between two string label vectors.
#[allow(unused)]
pub fn label_accuracy(pred: &[String], truth: &[String]) -> f64 {
    assert_eq!(pred.len(), truth.len());
    let hits = pred.iter().zip(truth).filter(|(a, b)| a == b).count();
    hits as f64 / truth.len() as f64
}
