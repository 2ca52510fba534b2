//! DUQ Shallow ConvNet training on BNCI 2014-001.
//!
//! Per subject: train the RBF-head variant with per-class binary
//! cross-entropy and L2 weight decay, then post-process the raw kernel
//! similarities (L1-normalize → temperature-scale → softmax → max)
//! into an interpretable confidence score.
use std::path::PathBuf;

use anyhow::Result;
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use clap::Parser;

use miuq::dataset::{self, TrialData, BNCI2014_001};
use miuq::eval;
use miuq::filter::{bandpass_trials, design_bandpass};
use miuq::models::{duq_confidence, ShallowConvNetConfig};
use miuq::plot;
use miuq::train::{fit_duq, predict_kernel, TrainConfig};

type B = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "scn_duq", about = "DUQ Shallow ConvNet (BNCI 2014-001)")]
struct Args {
    /// Preprocessed data directory; synthetic trials when omitted
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of subjects to run
    #[arg(long, default_value_t = BNCI2014_001.n_subjects)]
    subjects: usize,

    /// DUQ needs long training; early stopping tends to cut it short
    #[arg(long, default_value_t = 200)]
    epochs: usize,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// RBF kernel length scale
    #[arg(long, default_value_t = 0.2)]
    length_scale: f64,

    /// Softmax temperature for the confidence pipeline
    #[arg(long, default_value_t = 0.3)]
    temperature: f32,

    /// Directory for saved figures
    #[arg(long, default_value = "figures")]
    out_dir: PathBuf,

    /// Save confusion figures
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
    let device = Default::default();
    let band = design_bandpass(spec.fmin, spec.fmax, spec.sfreq);

    let model_cfg = ShallowConvNetConfig::new(spec.n_classes, spec.n_chans, spec.n_samples);
    let train_cfg = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        valid_fraction: 0.1,
        patience: Some(10),
        weight_decay: Some(1e-4),
        ..TrainConfig::default()
    };

    for subject_id in 1..=args.subjects {
        let mut data = load_subject(&args, subject_id)?;
        dataset::validate_class_count(&data.y, spec.n_classes)?;
        bandpass_trials(&mut data.x, &band)?;

        let (x_train, y_train, x_test, y_test) =
            dataset::train_test_split(&data.x, &data.y, args.test_fraction, 42)?;
        let (y_train_enc, _) = dataset::encode_labels(&y_train);
        let (y_test_enc, classes) = dataset::encode_labels(&y_test);
        let targets = dataset::one_hot(&y_train_enc, spec.n_classes);

        let (model, report) = fit_duq::<B>(
            &model_cfg,
            args.length_scale,
            &x_train,
            &targets,
            &train_cfg,
            &device,
        )?;
        println!(
            "Subject {subject_id}: trained {} epochs (best val loss {:?})",
            report.epochs_run, report.best_valid_loss
        );

        let inference = model.valid();
        let raw = predict_kernel(&inference, &x_test, args.batch_size, &device);

        // arg-max of the raw kernel similarities picks the class.
        let y_pred = eval::argmax_rows(&raw);
        let (_, confidence) = duq_confidence(&raw, args.temperature);

        let overall: f32 = confidence.mean().unwrap_or(0.0);
        println!("Overall Confidence:  {overall}");
        eval::report_subject(subject_id, &y_test_enc, &y_pred, spec.n_classes);

        if args.save_figures {
            std::fs::create_dir_all(&args.out_dir)?;
            let cm = eval::confusion_matrix(&y_test_enc, &y_pred, spec.n_classes);
            plot::plot_confusion_matrix(
                &cm,
                &classes,
                &format!("Confusion Matrix subject {subject_id}"),
                &args.out_dir.join(format!("duq_confusion_s{subject_id}.png")),
            )?;
        }
    }
    Ok(())
}
