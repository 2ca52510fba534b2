//! DUQ training and confidence-pipeline tests on a tiny, highly
//! separable synthetic problem.
mod common;

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use common::separable_trials;
use miuq::dataset::{encode_labels, one_hot};
use miuq::models::{duq_confidence, ShallowConvNetConfig};
use miuq::train::{fit_duq, predict_kernel, TrainConfig};

type B = Autodiff<NdArray>;

fn tiny_config() -> ShallowConvNetConfig {
    // 80-sample windows with a short pooling stage keep the test fast.
    ShallowConvNetConfig::new(2, 4, 80)
        .with_pool_size(20)
        .with_pool_stride(10)
}

#[test]
fn duq_learns_a_separable_problem() {
    let data = separable_trials(16, 2, 4, 80, 21);
    let (y_enc, _) = encode_labels(&data.y);
    let targets = one_hot(&y_enc, 2);

    let cfg = TrainConfig {
        epochs: 60,
        batch_size: 8,
        valid_fraction: 0.0,
        patience: None,
        weight_decay: Some(1e-4),
        ..TrainConfig::default()
    };
    let device = Default::default();
    let (model, report) =
        fit_duq::<B>(&tiny_config(), 0.2, &data.x, &targets, &cfg, &device).unwrap();
    assert!(report.epochs_run >= 1);

    let inference = model.valid();
    let raw = predict_kernel(&inference, &data.x, 8, &device);
    assert_eq!(raw.dim(), (data.y.len(), 2));

    let pred = miuq::eval::argmax_rows(&raw);
    let hits = pred.iter().zip(&y_enc).filter(|(a, b)| a == b).count();
    assert!(
        hits as f64 / y_enc.len() as f64 >= 0.9,
        "DUQ should fit well-separated training data ({hits}/{} hits)",
        y_enc.len()
    );
}

#[test]
fn confidence_pipeline_is_deterministic_and_bounded() {
    let data = separable_trials(8, 2, 4, 80, 33);
    let (y_enc, _) = encode_labels(&data.y);
    let targets = one_hot(&y_enc, 2);

    let cfg = TrainConfig {
        epochs: 5,
        batch_size: 8,
        valid_fraction: 0.0,
        patience: None,
        ..TrainConfig::default()
    };
    let device = Default::default();
    let (model, _) =
        fit_duq::<B>(&tiny_config(), 0.2, &data.x, &targets, &cfg, &device).unwrap();
    let inference = model.valid();

    let raw = predict_kernel(&inference, &data.x, 8, &device);
    let (proba, confidence) = duq_confidence(&raw, 0.3);
    let (proba2, confidence2) = duq_confidence(&raw, 0.3);

    // Same raw similarities must yield bit-identical confidences.
    assert_eq!(proba, proba2);
    assert_eq!(confidence, confidence2);

    for row in proba.rows() {
        approx::assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5_f32);
    }
    for &c in confidence.iter() {
        assert!((0.0..=1.0).contains(&c));
        // K = 2 softmax: the max is never below uniform.
        assert!(c >= 0.5 - 1e-6);
    }
}
