//! Deep Ensemble behavior on tiny synthetic problems.
mod common;

use burn::backend::{Autodiff, NdArray};
use common::separable_trials;
use miuq::dataset::encode_labels;
use miuq::ensemble::{predictive_entropy, DeepEnsemble};
use miuq::eval::argmax_rows;
use miuq::models::ShallowConvNetConfig;
use miuq::train::TrainConfig;

type B = Autodiff<NdArray>;

fn tiny_config() -> ShallowConvNetConfig {
    ShallowConvNetConfig::new(2, 4, 80)
        .with_pool_size(20)
        .with_pool_stride(10)
}

fn tiny_train_config() -> TrainConfig {
    TrainConfig {
        epochs: 60,
        batch_size: 8,
        valid_fraction: 0.0,
        patience: None,
        ..TrainConfig::default()
    }
}

#[test]
fn single_member_ensemble_matches_its_member() {
    let data = separable_trials(16, 2, 4, 80, 17);
    let (y_enc, _) = encode_labels(&data.y);
    let device = Default::default();

    let (ensemble, reports) = DeepEnsemble::<B>::fit(
        &tiny_config(),
        1,
        &data.x,
        &y_enc,
        &tiny_train_config(),
        &device,
    )
    .unwrap();
    assert_eq!(ensemble.n_members(), 1);
    assert_eq!(reports.len(), 1);

    // With k = 1 the average is the member distribution, exactly.
    let stack = ensemble.member_probabilities(&data.x, 8, &device);
    let avg = ensemble.predict_proba(&data.x, 8, &device);
    assert_eq!(avg, stack.index_axis(ndarray::Axis(0), 0).to_owned());

    let pred = argmax_rows(&avg);
    let hits = pred.iter().zip(&y_enc).filter(|(a, b)| a == b).count();
    assert!(
        hits as f64 / y_enc.len() as f64 >= 0.9,
        "single member should fit well-separated training data ({hits}/{} hits)",
        y_enc.len()
    );
}

#[test]
fn ensemble_fits_separable_training_data() {
    let data = separable_trials(16, 2, 4, 80, 29);
    let (y_enc, _) = encode_labels(&data.y);
    let device = Default::default();

    let (ensemble, _) = DeepEnsemble::<B>::fit(
        &tiny_config(),
        3,
        &data.x,
        &y_enc,
        &tiny_train_config(),
        &device,
    )
    .unwrap();

    let probs = ensemble.predict_proba(&data.x, 8, &device);
    let pred = argmax_rows(&probs);
    let hits = pred.iter().zip(&y_enc).filter(|(a, b)| a == b).count();
    assert!(
        hits as f64 / y_enc.len() as f64 >= 0.9,
        "ensemble should fit well-separated training data ({hits}/{} hits)",
        y_enc.len()
    );

    let entropy = predictive_entropy(&probs);
    for &h in entropy.iter() {
        assert!((0.0..=2.0_f32.ln() + 1e-5).contains(&h));
    }
}

#[test]
fn empty_ensemble_is_rejected() {
    let data = separable_trials(4, 2, 4, 80, 1);
    let (y_enc, _) = encode_labels(&data.y);
    let device = Default::default();
    let result = DeepEnsemble::<B>::fit(
        &tiny_config(),
        0,
        &data.x,
        &y_enc,
        &tiny_train_config(),
        &device,
    );
    assert!(result.is_err());
}
