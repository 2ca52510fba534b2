//! Benchmark dataset access and label utilities.
//!
//! Trials are read from a local preprocessed-data directory, one
//! safetensors file per subject:
//!
//! ```text
//! <data_dir>/<dataset>/subject_<id>.safetensors
//!     x : F32 [N, C, T]   trial tensor
//!     y : U8  [bytes]     newline-joined UTF-8 labels, one per trial
//! ```
//!
//! When no data directory is available every binary falls back to
//! [`synthetic_trials`], which draws class-distinct covariance structure
//! so the full pipeline stays runnable end to end.
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array2, Array3, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// One subject's trials: `x` is [N, C, T], `y` one label per trial.
#[derive(Debug, Clone)]
pub struct TrialData {
    pub x: Array3<f32>,
    pub y: Vec<String>,
    pub sfreq: f32,
}

impl TrialData {
    pub fn n_trials(&self) -> usize {
        self.x.shape()[0]
    }
}

/// Static description of a benchmark motor-imagery dataset.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub n_subjects: usize,
    pub n_classes: usize,
    pub n_chans: usize,
    pub n_samples: usize,
    pub sfreq: f32,
    /// Motor-imagery band edges (Hz).
    pub fmin: f32,
    pub fmax: f32,
}

/// BNCI 2014-001 (BCI Competition IV 2a): 9 subjects, 4-class, 22 ch.
pub const BNCI2014_001: DatasetSpec = DatasetSpec {
    name: "BNCI2014_001",
    n_subjects: 9,
    n_classes: 4,
    n_chans: 22,
    n_samples: 1001,
    sfreq: 250.0,
    fmin: 7.5,
    fmax: 30.0,
};

/// BNCI 2014-002: 14 subjects, 2-class, 15 ch.
pub const BNCI2014_002: DatasetSpec = DatasetSpec {
    name: "BNCI2014_002",
    n_subjects: 14,
    n_classes: 2,
    n_chans: 15,
    n_samples: 2561,
    sfreq: 512.0,
    fmin: 7.5,
    fmax: 30.0,
};

/// BNCI 2014-004: 9 subjects, 2-class, 3 bipolar ch.
pub const BNCI2014_004: DatasetSpec = DatasetSpec {
    name: "BNCI2014_004",
    n_subjects: 9,
    n_classes: 2,
    n_chans: 3,
    n_samples: 1126,
    sfreq: 250.0,
    fmin: 7.5,
    fmax: 30.0,
};

/// Zhou 2016: 4 subjects, 3-class, 14 ch.
pub const ZHOU2016: DatasetSpec = DatasetSpec {
    name: "Zhou2016",
    n_subjects: 4,
    n_classes: 3,
    n_chans: 14,
    n_samples: 1251,
    sfreq: 250.0,
    fmin: 7.5,
    fmax: 30.0,
};

impl DatasetSpec {
    /// Path of one subject's file under `data_dir`.
    pub fn subject_path(&self, data_dir: &Path, subject_id: usize) -> PathBuf {
        data_dir
            .join(self.name)
            .join(format!("subject_{subject_id}.safetensors"))
    }
}

// ── Safetensors I/O ──────────────────────────────────────────────────────

fn parse_header(bytes: &[u8]) -> Result<(serde_json::Map<String, serde_json::Value>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small");
    let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
    ensure!(bytes.len() >= 8 + n, "safetensors header truncated");
    let header: serde_json::Value =
        serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;
    let map = header
        .as_object()
        .context("safetensors header is not a JSON object")?
        .clone();
    Ok((map, 8 + n))
}

fn tensor_bytes<'a>(
    bytes: &'a [u8],
    data_start: usize,
    entry: &serde_json::Value,
) -> Result<&'a [u8]> {
    let offsets = entry["data_offsets"]
        .as_array()
        .context("tensor entry missing data_offsets")?;
    let s = offsets[0].as_u64().context("bad data offset")? as usize;
    let e = offsets[1].as_u64().context("bad data offset")? as usize;
    ensure!(data_start + e <= bytes.len(), "tensor data out of bounds");
    Ok(&bytes[data_start + s..data_start + e])
}

fn shape_of(entry: &serde_json::Value) -> Result<Vec<usize>> {
    entry["shape"]
        .as_array()
        .context("tensor entry missing shape")?
        .iter()
        .map(|v| v.as_u64().map(|u| u as usize).context("bad shape entry"))
        .collect()
}

/// Read one subject's trials from `data_dir`.
pub fn read_subject(data_dir: &Path, spec: &DatasetSpec, subject_id: usize) -> Result<TrialData> {
    let path = spec.subject_path(data_dir, subject_id);
    let bytes = std::fs::read(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let (header, data_start) = parse_header(&bytes)?;

    let x_entry = header.get("x").context("missing 'x' tensor")?;
    let shape = shape_of(x_entry)?;
    ensure!(shape.len() == 3, "'x' must be [N, C, T], got {shape:?}");
    let raw = tensor_bytes(&bytes, data_start, x_entry)?;
    let floats: Vec<f32> = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let x = Array3::from_shape_vec((shape[0], shape[1], shape[2]), floats)?;

    let y_entry = header.get("y").context("missing 'y' tensor")?;
    let y_raw = tensor_bytes(&bytes, data_start, y_entry)?;
    let y: Vec<String> = std::str::from_utf8(y_raw)
        .context("'y' labels are not valid UTF-8")?
        .split('\n')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    ensure!(
        y.len() == shape[0],
        "file has {} trials but {} labels",
        shape[0],
        y.len()
    );
    ensure!(
        shape[1] == spec.n_chans && shape[2] == spec.n_samples,
        "{}: expected trials of [{}ch, {}samples], got [{}, {}]",
        spec.name,
        spec.n_chans,
        spec.n_samples,
        shape[1],
        shape[2]
    );

    Ok(TrialData { x, y, sfreq: spec.sfreq })
}

/// Write one subject's trials (inverse of [`read_subject`]).
pub fn write_subject(
    data_dir: &Path,
    spec: &DatasetSpec,
    subject_id: usize,
    data: &TrialData,
) -> Result<()> {
    use std::io::Write;

    let path = spec.subject_path(data_dir, subject_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let x_bytes: Vec<u8> = data.x.iter().flat_map(|v| v.to_le_bytes()).collect();
    let y_bytes = data.y.join("\n").into_bytes();
    let shape = data.x.shape();

    let mut header = serde_json::Map::new();
    header.insert(
        "x".into(),
        serde_json::json!({
            "dtype": "F32",
            "shape": [shape[0], shape[1], shape[2]],
            "data_offsets": [0, x_bytes.len()],
        }),
    );
    header.insert(
        "y".into(),
        serde_json::json!({
            "dtype": "U8",
            "shape": [y_bytes.len()],
            "data_offsets": [x_bytes.len(), x_bytes.len() + y_bytes.len()],
        }),
    );
    let hdr = serde_json::to_vec(&header)?;
    let pad = (8 - hdr.len() % 8) % 8;

    let mut f = std::fs::File::create(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    f.write_all(&((hdr.len() + pad) as u64).to_le_bytes())?;
    f.write_all(&hdr)?;
    f.write_all(&vec![b' '; pad])?;
    f.write_all(&x_bytes)?;
    f.write_all(&y_bytes)?;
    Ok(())
}

// ── Label utilities ──────────────────────────────────────────────────────

/// Hard validation of the observed class count. Drivers call this before
/// any model fitting; a mismatch aborts the run.
pub fn validate_class_count(y: &[String], expected: usize) -> Result<()> {
    let mut unique: Vec<&String> = y.iter().collect();
    unique.sort();
    unique.dedup();
    ensure!(
        unique.len() == expected,
        "observed {} distinct labels, expected {expected} classes",
        unique.len()
    );
    Ok(())
}

/// Encode string labels as indices into a sorted-unique class list.
pub fn encode_labels(y: &[String]) -> (Vec<usize>, Vec<String>) {
    let mut classes: Vec<String> = y.to_vec();
    classes.sort();
    classes.dedup();
    let encoded = y
        .iter()
        .map(|label| classes.iter().position(|c| c == label).unwrap())
        .collect();
    (encoded, classes)
}

/// One-hot encode integer labels into [N, K] f32.
pub fn one_hot(y: &[usize], n_classes: usize) -> Array2<f32> {
    let mut out = Array2::zeros((y.len(), n_classes));
    for (i, &k) in y.iter().enumerate() {
        out[[i, k]] = 1.0;
    }
    out
}

/// `'balanced'` sample weights: `n / (k · count(class))` per trial.
pub fn balanced_sample_weights(y: &[String]) -> Vec<f64> {
    let (encoded, classes) = encode_labels(y);
    let mut counts = vec![0usize; classes.len()];
    for &k in &encoded {
        counts[k] += 1;
    }
    let n = y.len() as f64;
    let k = classes.len() as f64;
    encoded
        .iter()
        .map(|&c| n / (k * counts[c] as f64))
        .collect()
}

/// Seeded shuffled train/test split (trial axis).
/// Returns `(x_train, y_train, x_test, y_test)`.
pub fn train_test_split(
    x: &Array3<f32>,
    y: &[String],
    test_fraction: f64,
    seed: u64,
) -> Result<(Array3<f32>, Vec<String>, Array3<f32>, Vec<String>)> {
    let n = x.shape()[0];
    ensure!(n == y.len(), "got {} trials but {} labels", n, y.len());
    ensure!(
        (0.0..1.0).contains(&test_fraction),
        "test_fraction must be in [0, 1)"
    );

    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction).round() as usize;
    let (test_idx, train_idx) = idx.split_at(n_test);

    let take = |ids: &[usize]| -> (Array3<f32>, Vec<String>) {
        let views: Vec<_> = ids.iter().map(|&i| x.index_axis(Axis(0), i)).collect();
        let xs = ndarray::stack(Axis(0), &views).expect("consistent trial shapes");
        let ys = ids.iter().map(|&i| y[i].clone()).collect();
        (xs, ys)
    };
    if train_idx.is_empty() || test_idx.is_empty() {
        bail!("split left one side empty ({n} trials, test_fraction {test_fraction})");
    }
    let (x_train, y_train) = take(train_idx);
    let (x_test, y_test) = take(test_idx);
    Ok((x_train, y_train, x_test, y_test))
}

// ── Synthetic data ───────────────────────────────────────────────────────

/// Draw synthetic motor-imagery-like trials with class-distinct
/// covariance structure.
///
/// Each class gets its own channel mixing matrix; trials are that mixing
/// applied to unit white noise, so class covariances are well separated
/// when `separation` is large (≳ 2 gives near-perfectly separable
/// classes for MDM).
pub fn synthetic_trials(
    n_per_class: usize,
    n_classes: usize,
    n_chans: usize,
    n_samples: usize,
    sfreq: f32,
    separation: f32,
    seed: u64,
) -> TrialData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0_f32, 1.0).unwrap();

    // Per-class mixing: identity plus a class-specific gain pattern.
    let mixings: Vec<Array2<f32>> = (0..n_classes)
        .map(|k| {
            let mut a = Array2::eye(n_chans);
            for c in 0..n_chans {
                // Amplify a class-dependent subset of channels.
                if c % n_classes == k {
                    a[[c, c]] += separation;
                }
                // Small fixed cross-channel leakage.
                a[[c, (c + 1) % n_chans]] += 0.1;
            }
            a
        })
        .collect();

    let n = n_per_class * n_classes;
    let mut x = Array3::zeros((n, n_chans, n_samples));
    let mut y = Vec::with_capacity(n);

    for i in 0..n {
        let k = i % n_classes;
        let noise = Array2::from_shape_fn((n_chans, n_samples), |_| normal.sample(&mut rng));
        x.index_axis_mut(Axis(0), i).assign(&mixings[k].dot(&noise));
        y.push(format!("class_{k}"));
    }
    TrialData { x, y, sfreq }
}
