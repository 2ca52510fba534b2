//! End-to-end tests of the Riemannian MDM pipeline:
//! synthetic trials → band-pass → Ledoit-Wolf covariances → fit →
//! predict with uncertainty.
mod common;

use common::{label_accuracy, lwf_covs, separable_trials};
use miuq::dataset::{balanced_sample_weights, validate_class_count};
use miuq::filter::{bandpass_trials, design_bandpass};
use miuq::mdm::{Mdm, Metric, MetricPair};

#[test]
fn two_class_self_accuracy_at_least_95_percent() {
    let data = separable_trials(12, 2, 6, 256, 7);
    let covs = lwf_covs(&data);

    let mut model = Mdm::new(MetricPair::default());
    model.fit(&covs, &data.y, None).unwrap();

    let pred = model.predict(&covs).unwrap();
    assert!(
        label_accuracy(&pred, &data.y) >= 0.95,
        "well-separated classes must be recovered on the training set"
    );
}

#[test]
fn four_class_pipeline_with_bandpass_and_weights() {
    let mut data = separable_trials(10, 4, 8, 256, 3);
    validate_class_count(&data.y, 4).unwrap();

    let band = design_bandpass(7.5, 30.0, data.sfreq);
    bandpass_trials(&mut data.x, &band).unwrap();

    let covs = lwf_covs(&data);
    let weights = balanced_sample_weights(&data.y);

    let mut model = Mdm::new(MetricPair::default());
    model.fit(&covs, &data.y, Some(&weights)).unwrap();
    assert_eq!(model.classes().len(), 4);

    let pred = model.predict(&covs).unwrap();
    assert!(label_accuracy(&pred, &data.y) >= 0.9);
}

#[test]
fn uncertainty_is_normalized_and_bounded() {
    let data = separable_trials(8, 3, 6, 192, 11);
    let covs = lwf_covs(&data);

    let mut model = Mdm::new(MetricPair::default());
    model.fit(&covs, &data.y, None).unwrap();

    let (labels, uncertainty) = model.predict_with_uncertainty(&covs).unwrap();
    assert_eq!(labels.len(), covs.len());
    for &u in &uncertainty {
        assert!((0.0..=1.0).contains(&u), "uncertainty {u} out of [0, 1]");
    }

    // The probability-like view must sum to one per trial.
    let proba = model.predict_proba(&covs).unwrap();
    for row in proba.rows() {
        approx::assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn class_count_mismatch_aborts_before_fitting() {
    let data = separable_trials(8, 3, 6, 192, 5);
    // Driver contract: the validation error fires before any fit.
    assert!(validate_class_count(&data.y, 4).is_err());
}

#[test]
fn mean_and_distance_metrics_are_independent() {
    let data = separable_trials(10, 2, 6, 256, 13);
    let covs = lwf_covs(&data);

    for pair in [
        MetricPair::uniform(Metric::Riemann),
        MetricPair::uniform(Metric::LogEuclid),
        MetricPair { mean: Metric::LogEuclid, distance: Metric::Riemann },
    ] {
        let mut model = Mdm::new(pair);
        model.fit(&covs, &data.y, None).unwrap();
        let pred = model.predict(&covs).unwrap();
        assert!(
            label_accuracy(&pred, &data.y) >= 0.95,
            "metric pair {pair:?} failed on separable data"
        );
    }
}
