//! Plain Shallow ConvNet training on BNCI 2014-001.
//!
//! Per subject: band-pass, split, encode labels, train with categorical
//! cross-entropy, report test accuracy and macro F1. Optionally saves
//! the trained weights under `saved_models/`.
use std::path::PathBuf;

use anyhow::Result;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module};
use burn::record::CompactRecorder;
use clap::Parser;

use miuq::dataset::{self, TrialData, BNCI2014_001};
use miuq::eval;
use miuq::filter::{bandpass_trials, design_bandpass};
use miuq::models::ShallowConvNetConfig;
use miuq::train::{fit_scn, predict_proba, TrainConfig};

type B = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "scn_train", about = "Shallow ConvNet training (BNCI 2014-001)")]
struct Args {
    /// Preprocessed data directory; synthetic trials when omitted
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of subjects to run
    #[arg(long, default_value_t = BNCI2014_001.n_subjects)]
    subjects: usize,

    #[arg(long, default_value_t = 100)]
    epochs: usize,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Save trained weights to saved_models/
    #[arg(long, default_value_t = false)]
    save_model: bool,
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
    let device = Default::default();
    let band = design_bandpass(spec.fmin, spec.fmax, spec.sfreq);

    let model_cfg = ShallowConvNetConfig::new(spec.n_classes, spec.n_chans, spec.n_samples);
    let train_cfg = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        valid_fraction: 0.2,
        patience: None, // the plain experiment trains to the epoch budget
        ..TrainConfig::default()
    };

    for subject_id in 1..=args.subjects {
        let mut data = load_subject(&args, subject_id)?;
        dataset::validate_class_count(&data.y, spec.n_classes)?;
        bandpass_trials(&mut data.x, &band)?;

        let (x_train, y_train, x_test, y_test) =
            dataset::train_test_split(&data.x, &data.y, args.test_fraction, 42)?;
        let (y_train_enc, _) = dataset::encode_labels(&y_train);
        let (y_test_enc, _) = dataset::encode_labels(&y_test);

        let (model, report) = fit_scn::<B>(&model_cfg, &x_train, &y_train_enc, &train_cfg, &device)?;
        println!(
            "Subject {subject_id}: trained {} epochs (best val loss {:?})",
            report.epochs_run, report.best_valid_loss
        );

        let inference = model.valid();
        let probs = predict_proba(&inference, &x_test, args.batch_size, &device);
        let y_pred = eval::argmax_rows(&probs);
        eval::report_subject(subject_id, &y_test_enc, &y_pred, spec.n_classes);

        if args.save_model {
            std::fs::create_dir_all("saved_models")?;
            inference.save_file(
                PathBuf::from(format!("saved_models/scn_subject{subject_id}")),
                &CompactRecorder::new(),
            )?;
        }
    }
    Ok(())
}
