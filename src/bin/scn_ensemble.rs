//! Deep Ensembles of Shallow ConvNets across four benchmark datasets.
//!
//! For every (dataset, subject) pair: train `k` independently
//! initialized members with early stopping, average their predictive
//! distributions, and report accuracy, macro F1, mean predictive
//! entropy, confidence summaries, and calibration/confusion figures.
use std::path::PathBuf;

use anyhow::Result;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;

use miuq::dataset::{
    self, DatasetSpec, TrialData, BNCI2014_001, BNCI2014_002, BNCI2014_004, ZHOU2016,
};
use miuq::ensemble::{predictive_entropy, DeepEnsemble};
use miuq::eval;
use miuq::filter::{bandpass_trials, design_bandpass};
use miuq::models::ShallowConvNetConfig;
use miuq::plot;
use miuq::train::TrainConfig;

type B = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "scn_ensemble", about = "Deep Ensembles across four MI benchmarks")]
struct Args {
    /// Preprocessed data directory; synthetic trials when omitted
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Ensemble size
    #[arg(long, default_value_t = 10)]
    members: usize,

    #[arg(long, default_value_t = 100)]
    epochs: usize,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Directory for saved figures
    #[arg(long, default_value = "figures")]
    out_dir: PathBuf,

    /// Save confusion/calibration figures
    #[arg(long, default_value_t = false)]
    save_figures: bool,
}

fn load_subject(args: &Args, spec: &DatasetSpec, subject_id: usize) -> Result<TrialData> {
    match &args.data_dir {
        Some(dir) => dataset::read_subject(dir, spec, subject_id),
        None => Ok(dataset::synthetic_trials(
            24,
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
    let device = Default::default();

    // Class counts, channel counts, and window lengths differ per
    // dataset, so each gets its own model configuration.
    let datasets = [BNCI2014_002, ZHOU2016, BNCI2014_004, BNCI2014_001];

    let train_cfg = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        valid_fraction: 0.1,
        patience: Some(20),
        ..TrainConfig::default()
    };

    for (dataset_id, spec) in datasets.iter().enumerate().map(|(i, s)| (i + 1, s)) {
        let band = design_bandpass(spec.fmin, spec.fmax, spec.sfreq);
        let model_cfg = ShallowConvNetConfig::new(spec.n_classes, spec.n_chans, spec.n_samples);

        for subject_id in 1..=spec.n_subjects {
            let mut data = load_subject(&args, spec, subject_id)?;
            dataset::validate_class_count(&data.y, spec.n_classes)?;
            bandpass_trials(&mut data.x, &band)?;

            let (x_train, y_train, x_test, y_test) =
                dataset::train_test_split(&data.x, &data.y, args.test_fraction, 42)?;
            let (y_train_enc, _) = dataset::encode_labels(&y_train);
            let (y_test_enc, classes) = dataset::encode_labels(&y_test);

            let (ensemble, _reports) = DeepEnsemble::<B>::fit(
                &model_cfg,
                args.members,
                &x_train,
                &y_train_enc,
                &train_cfg,
                &device,
            )?;

            let probs = ensemble.predict_proba(&x_test, args.batch_size, &device);
            let y_pred = eval::argmax_rows(&probs);

            let entropy = predictive_entropy(&probs);
            let mean_entropy: f32 = entropy.mean().unwrap_or(0.0);
            println!("[{}] subject {subject_id}", spec.name);
            println!("Entropy:  {mean_entropy}");

            eval::report_subject(subject_id, &y_test_enc, &y_pred, spec.n_classes);

            let correct: Vec<bool> =
                y_test_enc.iter().zip(&y_pred).map(|(a, b)| a == b).collect();
            let confidence: Vec<f64> = eval::max_rows(&probs)
                .iter()
                .map(|&c| c as f64)
                .collect();
            eval::report_confidence(&confidence, &correct);

            if args.save_figures {
                std::fs::create_dir_all(&args.out_dir)?;
                let tag = format!("d{dataset_id}_s{subject_id}");
                let cm = eval::confusion_matrix(&y_test_enc, &y_pred, spec.n_classes);
                plot::plot_confusion_matrix(
                    &cm,
                    &classes,
                    &format!("Confusion Matrix subject {subject_id} dataset {dataset_id}"),
                    &args.out_dir.join(format!("de_confusion_{tag}.png")),
                )?;
                let bins = eval::calibration_curve(&confidence, &correct, 10)?;
                plot::plot_calibration(
                    &bins,
                    &format!("Calibration subject {subject_id} dataset {dataset_id}"),
                    &args.out_dir.join(format!("de_calibration_{tag}.png")),
                )?;
            }
        }
    }
    Ok(())
}
