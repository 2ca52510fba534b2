//! Band-pass FIR filtering for the motor-imagery band.
//!
//! The benchmark paradigm restricts trials to 7.5–30 Hz before any
//! covariance estimation or network training. The filter is a
//! Hamming-windowed sinc (firwin) band-pass with MNE-style automatic
//! transition bandwidth and length, applied zero-phase with overlap-add
//! FFT convolution.
use std::f64::consts::PI;

use anyhow::Result;
use ndarray::{Array2, Array3};
use rustfft::{num_complex::Complex, FftPlanner};

/// Transition bandwidth for a band edge at `freq` Hz:
/// `min(max(0.25·freq, 2.0), freq)`, additionally capped by the distance
/// to Nyquist for the upper edge.
pub fn auto_trans_bandwidth(freq: f32, sfreq: f32) -> f32 {
    let nyq = sfreq / 2.0;
    (0.25 * freq).max(2.0).min(freq).min((nyq - freq).max(f32::MIN_POSITIVE))
}

/// FIR length for a transition bandwidth: `ceil(3.3 / trans_bw · sfreq)`,
/// rounded up to odd (zero-phase linear-phase FIR needs odd N).
pub fn auto_filter_length(trans_bw: f32, sfreq: f32) -> usize {
    let n = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

/// Design a zero-phase band-pass FIR for the `[l_freq, h_freq]` Hz band.
///
/// Built as the difference of two Hamming-windowed lowpass kernels of
/// equal length (cutoffs at the transition-band midpoints of each edge).
/// Returns the impulse response, odd length.
pub fn design_bandpass(l_freq: f32, h_freq: f32, sfreq: f32) -> Vec<f32> {
    assert!(
        0.0 < l_freq && l_freq < h_freq && h_freq < sfreq / 2.0,
        "band edges must satisfy 0 < l_freq < h_freq < Nyquist"
    );
    let l_bw = auto_trans_bandwidth(l_freq, sfreq);
    let h_bw = auto_trans_bandwidth(h_freq, sfreq);

    // One shared length, driven by the narrower transition band.
    let n = auto_filter_length(l_bw.min(h_bw), sfreq);

    let l_cut = l_freq - l_bw / 2.0;
    let h_cut = h_freq + h_bw / 2.0;

    let lp_hi = firwin_lowpass(n, h_cut, sfreq);
    let lp_lo = firwin_lowpass(n, l_cut, sfreq);
    lp_hi
        .iter()
        .zip(&lp_lo)
        .map(|(&hi, &lo)| (hi - lo) as f32)
        .collect()
}

/// Hamming-windowed sinc lowpass with unit DC gain; `n` must be odd.
pub fn firwin_lowpass(n: usize, cutoff_hz: f32, sfreq: f32) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for a linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz as f64 / (sfreq as f64 / 2.0); // normalised [0, 1]

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            let win = 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
            sinc * win
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);
    h
}

/// Apply a zero-phase FIR filter to each channel of `data` ([C, T]).
pub fn apply_fir_zero_phase(data: &mut Array2<f32>, h: &[f32]) -> Result<()> {
    for ch in 0..data.nrows() {
        let row: Vec<f32> = data.row(ch).to_vec();
        let filtered = filter_1d(&row, h);
        data.row_mut(ch).assign(&ndarray::ArrayView1::from(&filtered));
    }
    Ok(())
}

/// Band-pass every trial of `trials` ([N, C, T]) in place.
pub fn bandpass_trials(trials: &mut Array3<f32>, h: &[f32]) -> Result<()> {
    let n = trials.shape()[0];
    for i in 0..n {
        let mut trial = trials
            .index_axis_mut(ndarray::Axis(0), i)
            .to_owned();
        apply_fir_zero_phase(&mut trial, h)?;
        trials
            .index_axis_mut(ndarray::Axis(0), i)
            .assign(&trial);
    }
    Ok(())
}

/// Filter one 1-D signal, zero-phase, same length as the input.
///
/// Overlap-add FFT convolution; the zero-phase shift of `(N−1)/2`
/// samples is absorbed when accumulating, and the edge transient is
/// suppressed by odd-reflection padding of `N−1` samples per side.
pub fn filter_1d(x: &[f32], h: &[f32]) -> Vec<f32> {
    let n_x = x.len();
    let n_h = h.len();
    if n_x == 0 {
        return vec![];
    }

    let shift = (n_h - 1) / 2;
    let n_edge = n_h - 1;
    let x_ext = reflect_pad(x, n_edge);
    let n_ext = x_ext.len();

    let n_fft = (2 * n_h - 1).max(4096).next_power_of_two();
    let n_seg = n_fft - n_h + 1;

    let mut planner: FftPlanner<f32> = FftPlanner::new();
    let fwd = planner.plan_fft_forward(n_fft);
    let inv = planner.plan_fft_inverse(n_fft);
    let scale = 1.0 / n_fft as f32;

    // FFT of the kernel, zero-padded.
    let mut h_fft: Vec<Complex<f32>> = h
        .iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    fwd.process(&mut h_fft);

    let mut out = vec![0.0_f32; n_ext];
    let n_segments = n_ext.div_ceil(n_seg);
    for seg in 0..n_segments {
        let start = seg * n_seg;
        let stop = (start + n_seg).min(n_ext);

        let mut buf: Vec<Complex<f32>> = x_ext[start..stop]
            .iter()
            .map(|&v| Complex { re: v, im: 0.0 })
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();
        fwd.process(&mut buf);
        for (b, &hf) in buf.iter_mut().zip(&h_fft) {
            *b *= hf;
        }
        inv.process(&mut buf);

        // Accumulate, shifted left by (N-1)/2 for zero phase.
        let out_start = start.saturating_sub(shift);
        let skip = shift.saturating_sub(start);
        for (o, p) in (out_start..n_ext).zip(skip..n_fft) {
            out[o] += buf[p].re * scale;
        }
    }

    out[n_edge..n_edge + n_x].to_vec()
}

/// Odd reflection padding around both end samples (`2·x[0] − x[i]` on the
/// left, mirrored on the right); pads with zeros past the signal length.
fn reflect_pad(x: &[f32], n_pad: usize) -> Vec<f32> {
    let n = x.len();
    let usable = n_pad.min(n - 1);

    let mut out = Vec::with_capacity(n + 2 * n_pad);
    out.extend(std::iter::repeat(0.0).take(n_pad - usable));
    for i in (1..=usable).rev() {
        out.push(2.0 * x[0] - x[i]);
    }
    out.extend_from_slice(x);
    let last = x[n - 1];
    for i in 1..=usable {
        out.push(2.0 * last - x[n - 1 - i]);
    }
    out.extend(std::iter::repeat(0.0).take(n_pad - usable));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandpass_is_odd_length_and_symmetric() {
        let h = design_bandpass(7.5, 30.0, 250.0);
        let n = h.len();
        assert!(n % 2 == 1);
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-7_f32);
        }
    }

    #[test]
    fn bandpass_blocks_dc() {
        // Taps of a band-pass must sum to ≈ 0.
        let h = design_bandpass(7.5, 30.0, 250.0);
        let s: f32 = h.iter().sum();
        assert!(s.abs() < 1e-5, "band-pass DC gain = {s}");
    }

    #[test]
    fn in_band_tone_passes_out_of_band_tone_dies() {
        let sfreq = 250.0_f32;
        let h = design_bandpass(7.5, 30.0, sfreq);
        let n = 4096;
        let tone = |f: f32| -> Vec<f32> {
            (0..n)
                .map(|t| (2.0 * std::f32::consts::PI * f * t as f32 / sfreq).sin())
                .collect()
        };
        let rms_interior = |x: &[f32]| -> f32 {
            let lo = h.len().min(x.len() / 4);
            let inner = &x[lo..x.len() - lo];
            (inner.iter().map(|v| v * v).sum::<f32>() / inner.len() as f32).sqrt()
        };

        let passed = filter_1d(&tone(15.0), &h);
        let blocked = filter_1d(&tone(60.0), &h);
        assert!(rms_interior(&passed) > 0.5, "15 Hz tone should pass");
        assert!(rms_interior(&blocked) < 0.05, "60 Hz tone should be rejected");
    }

    #[test]
    fn filter_preserves_length() {
        let x: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.1).sin()).collect();
        let h = design_bandpass(7.5, 30.0, 250.0);
        assert_eq!(filter_1d(&x, &h).len(), x.len());
    }

    #[test]
    fn reflect_pad_left_values() {
        let x = [1.0_f32, 2.0, 3.0, 4.0, 5.0];
        let padded = reflect_pad(&x, 3);
        // left: 2*1-4, 2*1-3, 2*1-2
        assert_eq!(&padded[..3], &[-2.0_f32, -1.0, 0.0]);
        assert_eq!(&padded[3..8], &x[..]);
    }
}
