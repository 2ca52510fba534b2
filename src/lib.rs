//! # miuq — EEG motor-imagery classification with uncertainty estimation
//!
//! `miuq` implements three uncertainty-estimation strategies for
//! motor-imagery EEG classification and the experiment drivers that
//! compare them on public benchmark datasets:
//!
//! - **Riemannian MDM**: minimum-distance-to-mean classification of
//!   trial covariance matrices on the SPD manifold, with a
//!   dispersion-based uncertainty score per prediction;
//! - **DUQ**: a Shallow ConvNet whose softmax is replaced by an RBF
//!   output layer, with temperature-scaled confidence at inference;
//! - **Deep Ensembles**: k independently trained Shallow ConvNets whose
//!   averaged predictive distribution carries the uncertainty.
//!
//! ## Pipeline overview
//!
//! ```text
//! <data_dir>/<dataset>/subject_<id>.safetensors   (or synthetic trials)
//!   │
//!   ├─ dataset::read_subject()        trials [N, C, T] + labels
//!   ├─ dataset::validate_class_count  hard abort on mismatch
//!   ├─ filter::bandpass_trials()      7.5–30 Hz motor-imagery band
//!   │
//!   ├─ Riemannian branch:
//!   │    covariance::covariances('lwf') → mdm::Mdm (fit / predict /
//!   │    predict_with_uncertainty)
//!   │
//!   ├─ network branch:
//!   │    models::{ShallowConvNet, ShallowConvNetDuq} → train::fit_*
//!   │    → ensemble::DeepEnsemble / models::duq_confidence
//!   │
//!   └─ eval + plot:
//!        accuracy · macro F1 · confusion heatmap · calibration curve
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use miuq::covariance::{covariances, CovEstimator};
//! use miuq::dataset::synthetic_trials;
//! use miuq::mdm::{Mdm, MetricPair};
//!
//! let data = synthetic_trials(20, 2, 8, 256, 250.0, 2.0, 42);
//! let covs = covariances(&data.x, CovEstimator::LedoitWolf).unwrap();
//!
//! let mut model = Mdm::new(MetricPair::default());
//! model.fit(&covs, &data.y, None).unwrap();
//! let (labels, uncertainty) = model.predict_with_uncertainty(&covs).unwrap();
//! for (label, u) in labels.iter().zip(&uncertainty) {
//!     println!("{label}  (uncertainty {u:.3})");
//! }
//! ```
//!
//! Each experiment also ships as a binary (`mdm_uncertainty`,
//! `scn_train`, `scn_duq`, `scn_ensemble`); all of them fall back to
//! synthetic data when no `--data-dir` is given.

pub mod covariance;
pub mod dataset;
pub mod ensemble;
pub mod eval;
pub mod filter;
pub mod mdm;
pub mod models;
pub mod plot;
pub mod spd;
pub mod train;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `miuq::Foo` without having to know the internal module layout.

// dataset
pub use dataset::{
    balanced_sample_weights, encode_labels, one_hot, read_subject, synthetic_trials,
    train_test_split, validate_class_count, write_subject, DatasetSpec, TrialData,
};

// filter
pub use filter::{apply_fir_zero_phase, bandpass_trials, design_bandpass, filter_1d};

// covariance + SPD geometry
pub use covariance::{covariances, trial_covariance, CovEstimator};
pub use spd::{
    distance_logeuclid, distance_riemann, expm, invsqrtm, is_spd, logm, mean_logeuclid,
    mean_riemann, sqrtm,
};

// classifiers
pub use mdm::{Mdm, Metric, MetricPair};
pub use models::{
    duq_confidence, RbfOutput, RbfOutputConfig, ShallowConvNet, ShallowConvNetConfig,
    ShallowConvNetDuq,
};

// training + ensembles
pub use ensemble::{average_probabilities, predictive_entropy, DeepEnsemble};
pub use train::{fit_duq, fit_scn, predict_kernel, predict_proba, FitReport, TrainConfig};

// evaluation + plotting
pub use eval::{
    accuracy, argmax_rows, calibration_curve, confusion_matrix, expected_calibration_error,
    f1_macro, max_rows, CalibrationBin,
};
pub use plot::{plot_calibration, plot_confusion_matrix};
