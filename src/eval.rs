//! Metrics: accuracy, macro F1, confusion matrix, calibration.
//!
//! Pure functions from (predictions, ground truth[, confidence]) to
//! numbers; the drivers print them and hand the matrices to
//! [`crate::plot`] for rendering.
use anyhow::{ensure, Result};
use ndarray::{Array1, Array2};

/// Fraction of exact matches.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    assert_eq!(y_true.len(), y_pred.len());
    let hits = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    hits as f64 / y_true.len() as f64
}

/// Macro-averaged F1 over all `n_classes` labels (absent classes
/// contribute 0, as in scikit-learn's `average='macro'`).
pub fn f1_macro(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let cm = confusion_matrix(y_true, y_pred, n_classes);
    let mut f1_sum = 0.0;
    for k in 0..n_classes {
        let tp = cm[[k, k]] as f64;
        let fp = (0..n_classes).map(|i| cm[[i, k]]).sum::<usize>() as f64 - tp;
        let fn_ = (0..n_classes).map(|j| cm[[k, j]]).sum::<usize>() as f64 - tp;
        let denom = 2.0 * tp + fp + fn_;
        if denom > 0.0 {
            f1_sum += 2.0 * tp / denom;
        }
    }
    f1_sum / n_classes as f64
}

/// Confusion matrix with true labels as rows, predictions as columns.
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Array2<usize> {
    assert_eq!(y_true.len(), y_pred.len());
    let mut cm = Array2::zeros((n_classes, n_classes));
    for (&t, &p) in y_true.iter().zip(y_pred) {
        cm[[t, p]] += 1;
    }
    cm
}

/// Arg-max class index per row of a probability matrix.
pub fn argmax_rows(probs: &Array2<f32>) -> Vec<usize> {
    probs
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Row maximum (the confidence of the arg-max class) per trial.
pub fn max_rows(probs: &Array2<f32>) -> Array1<f32> {
    probs.map_axis(ndarray::Axis(1), |row| {
        row.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
    })
}

/// One bin of a reliability diagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBin {
    /// Mean predicted confidence of trials in the bin.
    pub mean_confidence: f64,
    /// Observed accuracy of trials in the bin.
    pub accuracy: f64,
    pub count: usize,
}

/// Uniform-width calibration curve over `[0, 1]`; empty bins are
/// skipped. `correct[i]` says whether trial `i` was classified
/// correctly, `confidence[i]` is its predicted confidence.
pub fn calibration_curve(
    confidence: &[f64],
    correct: &[bool],
    n_bins: usize,
) -> Result<Vec<CalibrationBin>> {
    ensure!(confidence.len() == correct.len(), "confidence/correct length mismatch");
    ensure!(n_bins >= 1, "need at least one bin");
    ensure!(
        confidence.iter().all(|&c| (0.0..=1.0).contains(&c)),
        "confidence values must lie in [0, 1]"
    );

    let mut sums = vec![(0.0_f64, 0usize, 0usize); n_bins]; // (conf sum, hits, count)
    for (&c, &ok) in confidence.iter().zip(correct) {
        let bin = ((c * n_bins as f64) as usize).min(n_bins - 1);
        sums[bin].0 += c;
        sums[bin].1 += ok as usize;
        sums[bin].2 += 1;
    }
    Ok(sums
        .into_iter()
        .filter(|&(_, _, count)| count > 0)
        .map(|(conf_sum, hits, count)| CalibrationBin {
            mean_confidence: conf_sum / count as f64,
            accuracy: hits as f64 / count as f64,
            count,
        })
        .collect())
}

/// Expected calibration error: count-weighted mean |accuracy − confidence|
/// over the bins.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    bins.iter()
        .map(|b| (b.count as f64 / total as f64) * (b.accuracy - b.mean_confidence).abs())
        .sum()
}

/// Per-subject console report: validation accuracy and macro F1.
pub fn report_subject(subject_id: usize, y_true: &[usize], y_pred: &[usize], n_classes: usize) {
    println!(
        "Subject {subject_id} Validation accuracy:  {}",
        accuracy(y_true, y_pred)
    );
    println!(
        "F1 score subject {subject_id}:  {}",
        f1_macro(y_true, y_pred, n_classes)
    );
}

/// Confidence summary for an uncertainty-aware driver: overall mean,
/// and the split between correctly and incorrectly classified trials.
pub fn report_confidence(confidence: &[f64], correct: &[bool]) {
    let mean = |sel: &dyn Fn(usize) -> bool| -> Option<f64> {
        let vals: Vec<f64> = confidence
            .iter()
            .enumerate()
            .filter(|&(i, _)| sel(i))
            .map(|(_, &c)| c)
            .collect();
        if vals.is_empty() {
            None
        } else {
            Some(vals.iter().sum::<f64>() / vals.len() as f64)
        }
    };

    if let Some(overall) = mean(&|_| true) {
        println!("Overall Confidence:  {overall}");
    }
    if let Some(on_correct) = mean(&|i| correct[i]) {
        println!("Confidence on correct predictions:  {on_correct}");
    }
    if let Some(on_wrong) = mean(&|i| !correct[i]) {
        println!("Confidence on incorrect predictions:  {on_wrong}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accuracy_and_confusion() {
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 1, 1, 1];
        approx::assert_abs_diff_eq!(accuracy(&y_true, &y_pred), 0.75);
        let cm = confusion_matrix(&y_true, &y_pred, 2);
        assert_eq!(cm[[0, 0]], 1);
        assert_eq!(cm[[0, 1]], 1);
        assert_eq!(cm[[1, 1]], 2);
        assert_eq!(cm[[1, 0]], 0);
    }

    #[test]
    fn f1_macro_known_value() {
        // class 0: tp=1 fp=0 fn=1 → f1 = 2/3; class 1: tp=2 fp=1 fn=0 → f1 = 4/5.
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 1, 1, 1];
        approx::assert_abs_diff_eq!(
            f1_macro(&y_true, &y_pred, 2),
            (2.0 / 3.0 + 4.0 / 5.0) / 2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn perfect_predictions_give_perfect_scores() {
        let y = [0, 1, 2, 1, 0];
        approx::assert_abs_diff_eq!(accuracy(&y, &y), 1.0);
        approx::assert_abs_diff_eq!(f1_macro(&y, &y, 3), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn argmax_and_max_rows() {
        let probs = array![[0.1_f32, 0.7, 0.2], [0.6, 0.3, 0.1]];
        assert_eq!(argmax_rows(&probs), vec![1, 0]);
        let m = max_rows(&probs);
        approx::assert_abs_diff_eq!(m[0], 0.7_f32);
        approx::assert_abs_diff_eq!(m[1], 0.6_f32);
    }

    #[test]
    fn calibration_of_perfectly_calibrated_data() {
        // Confidence 0.75, accuracy 3/4 → ECE = 0.
        let confidence = [0.75; 4];
        let correct = [true, true, true, false];
        let bins = calibration_curve(&confidence, &correct, 10).unwrap();
        assert_eq!(bins.len(), 1);
        approx::assert_abs_diff_eq!(bins[0].accuracy, 0.75);
        approx::assert_abs_diff_eq!(bins[0].mean_confidence, 0.75);
        approx::assert_abs_diff_eq!(expected_calibration_error(&bins), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn calibration_skips_empty_bins_and_flags_overconfidence() {
        let confidence = [0.95, 0.92, 0.98, 0.05];
        let correct = [false, false, true, false];
        let bins = calibration_curve(&confidence, &correct, 10).unwrap();
        assert_eq!(bins.len(), 2);
        let ece = expected_calibration_error(&bins);
        assert!(ece > 0.3, "overconfident predictions should yield large ECE, got {ece}");
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        assert!(calibration_curve(&[1.2], &[true], 10).is_err());
    }
}
