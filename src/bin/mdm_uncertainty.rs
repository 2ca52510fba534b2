//! Riemannian MDM with uncertainty on BNCI 2014-001.
//!
//! Per subject: band-pass to the motor-imagery band, reduce trials to
//! Ledoit-Wolf covariances, fit a minimum-distance-to-mean classifier
//! with balanced sample weights, and report predictions together with
//! the distance-dispersion uncertainty score.
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use miuq::covariance::{covariances, CovEstimator};
use miuq::dataset::{self, TrialData, BNCI2014_001};
use miuq::eval;
use miuq::filter::{bandpass_trials, design_bandpass};
use miuq::mdm::{Mdm, MetricPair};
use miuq::plot;

#[derive(Parser)]
#[command(name = "mdm_uncertainty", about = "Riemannian MDM with uncertainty (BNCI 2014-001)")]
struct Args {
    /// Preprocessed data directory; synthetic trials when omitted
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of subjects to run
    #[arg(long, default_value_t = BNCI2014_001.n_subjects)]
    subjects: usize,

    /// Held-out test fraction
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Directory for saved figures
    #[arg(long, default_value = "figures")]
    out_dir: PathBuf,

    /// Save confusion/calibration figures
    #[arg(long, default_value_t = false)]
    save_figures: bool,
}

fn load_subject(args: &Args, subject_id: usize) -> Result<TrialData> {
    let spec = &BNCI2014_001;
    match &args.data_dir {
        Some(dir) => dataset::read_subject(dir, spec, subject_id),
        None => Ok(dataset::synthetic_trials(
            36,
            spec.n_classes,
            spec.n_chans,
            spec.n_samples,
            spec.sfreq,
            2.0,
            subject_id as u64,
        )),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let spec = &BNCI2014_001;
    let band = design_bandpass(spec.fmin, spec.fmax, spec.sfreq);

    for subject_id in 1..=args.subjects {
        let mut data = load_subject(&args, subject_id)?;
        dataset::validate_class_count(&data.y, spec.n_classes)?;
        bandpass_trials(&mut data.x, &band)?;

        let covs = covariances(&data.x, CovEstimator::LedoitWolf)?;
        let (x_train, y_train, x_test, y_test) = split_covs(&covs, &data.y, args.test_fraction)?;
        let weights = dataset::balanced_sample_weights(&y_train);

        let mut model = Mdm::new(MetricPair::default());
        model.fit(&x_train, &y_train, Some(&weights))?;

        let (predictions, uncertainty) = model.predict_with_uncertainty(&x_test)?;
        println!("Predictions: {predictions:?}");
        println!("Uncertainty: {uncertainty:?}");

        let (y_true, classes) = dataset::encode_labels(&y_test);
        let y_pred: Vec<usize> = predictions
            .iter()
            .map(|p| classes.iter().position(|c| c == p).unwrap_or(0))
            .collect();
        eval::report_subject(subject_id, &y_true, &y_pred, spec.n_classes);

        let correct: Vec<bool> = y_true.iter().zip(&y_pred).map(|(a, b)| a == b).collect();
        let confidence: Vec<f64> = uncertainty.iter().map(|&u| 1.0 - u).collect();
        eval::report_confidence(&confidence, &correct);

        if args.save_figures {
            std::fs::create_dir_all(&args.out_dir)?;
            let cm = eval::confusion_matrix(&y_true, &y_pred, spec.n_classes);
            plot::plot_confusion_matrix(
                &cm,
                &classes,
                &format!("Confusion Matrix subject {subject_id}"),
                &args.out_dir.join(format!("mdm_confusion_s{subject_id}.png")),
            )?;
            let bins = eval::calibration_curve(&confidence, &correct, 10)?;
            plot::plot_calibration(
                &bins,
                &format!("Calibration subject {subject_id}"),
                &args.out_dir.join(format!("mdm_calibration_s{subject_id}.png")),
            )?;
        }
    }
    Ok(())
}

/// Seeded trial-level split of covariance matrices and labels.
fn split_covs(
    covs: &[nalgebra::DMatrix<f64>],
    y: &[String],
    test_fraction: f64,
) -> Result<(
    Vec<nalgebra::DMatrix<f64>>,
    Vec<String>,
    Vec<nalgebra::DMatrix<f64>>,
    Vec<String>,
)> {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let n = covs.len();
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
    idx.shuffle(&mut rng);
    let n_test = ((n as f64) * test_fraction).round() as usize;
    let (test_idx, train_idx) = idx.split_at(n_test);

    let pick = |ids: &[usize]| -> (Vec<nalgebra::DMatrix<f64>>, Vec<String>) {
        (
            ids.iter().map(|&i| covs[i].clone()).collect(),
            ids.iter().map(|&i| y[i].clone()).collect(),
        )
    };
    let (x_train, y_train) = pick(train_idx);
    let (x_test, y_test) = pick(test_idx);
    Ok((x_train, y_train, x_test, y_test))
}
