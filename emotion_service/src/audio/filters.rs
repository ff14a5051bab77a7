//! Filterbanks and spectral helpers for the audio feature tensor.
//!
//! Conventions follow the ones the audio classifier was trained with:
//! Slaney mel scale with area-normalised filters, Gaussian chroma bumps
//! with an octave weighting centred on octave 5, and dB conversion with
//! `amin = 1e-10` and an 80 dB dynamic range.

use ndarray::{Array1, Array2, Axis};
use std::f32::consts::PI;

const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;

/// Periodic Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

/// Centre frequency of every rfft bin.
pub fn fft_frequencies(sample_rate: f32, n_fft: usize) -> Array1<f32> {
    let n_bins = n_fft / 2 + 1;
    Array1::from_iter((0..n_bins).map(|k| k as f32 * sample_rate / n_fft as f32))
}

const MEL_F_SP: f32 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f32 = 1000.0;
const MEL_MIN_LOG_MEL: f32 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_logstep() -> f32 {
    6.4f32.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_logstep()
    } else {
        hz / MEL_F_SP
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_logstep() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        MEL_F_SP * mel
    }
}

/// `(n_mels, n_fft / 2 + 1)` triangular filters between 0 Hz and Nyquist.
pub fn mel_filterbank(sample_rate: f32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let mel_max = hz_to_mel(sample_rate / 2.0);
    let mel_f: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, fft_freqs.len()));
    for m in 0..n_mels {
        let lower_width = mel_f[m + 1] - mel_f[m];
        let upper_width = mel_f[m + 2] - mel_f[m + 1];
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[m]) / lower_width;
            let upper = (mel_f[m + 2] - f) / upper_width;
            weights[[m, k]] = lower.min(upper).max(0.0) * enorm;
        }
    }
    weights
}

fn hz_to_octs(hz: f32, tuning: f32, bins_per_octave: usize) -> f32 {
    let a440 = 440.0 * 2f32.powf(tuning / bins_per_octave as f32);
    (hz / (a440 / 16.0)).log2()
}

/// `(n_chroma, n_fft / 2 + 1)` chroma filterbank starting at C.
///
/// `tuning` is the deviation from A440 in fractions of a chroma bin.
pub fn chroma_filterbank(sample_rate: f32, n_fft: usize, n_chroma: usize, tuning: f32) -> Array2<f32> {
    const CENTER_OCTAVE: f32 = 5.0;
    const OCTAVE_WIDTH: f32 = 2.0;
    let n_chroma_f = n_chroma as f32;

    // Fractional chroma bin of every full-length fft bin; bin 0 (DC) gets a
    // value one and a half octaves below bin 1.
    let mut frq_bins: Vec<f32> = (1..n_fft)
        .map(|k| n_chroma_f * hz_to_octs(k as f32 * sample_rate / n_fft as f32, tuning, n_chroma))
        .collect();
    frq_bins.insert(0, frq_bins[0] - 1.5 * n_chroma_f);

    let mut bin_widths: Vec<f32> = frq_bins.windows(2).map(|w| (w[1] - w[0]).max(1.0)).collect();
    bin_widths.push(1.0);

    let half = (n_chroma_f / 2.0).round();
    let mut weights = Array2::<f32>::zeros((n_chroma, n_fft));
    for (k, (&frq, &width)) in frq_bins.iter().zip(bin_widths.iter()).enumerate() {
        for c in 0..n_chroma {
            let d = (frq - c as f32 + half + 10.0 * n_chroma_f).rem_euclid(n_chroma_f) - half;
            weights[[c, k]] = (-0.5 * (2.0 * d / width).powi(2)).exp();
        }
    }

    // Unit L2 norm per fft bin, then the octave weighting.
    for (k, mut column) in weights.axis_iter_mut(Axis(1)).enumerate() {
        let norm = column.iter().map(|v| v * v).sum::<f32>().sqrt();
        let octave = frq_bins[k] / n_chroma_f;
        let octave_weight = (-0.5 * ((octave - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();
        let scale = if norm > f32::MIN_POSITIVE { octave_weight / norm } else { octave_weight };
        column.mapv_inplace(|v| v * scale);
    }

    // Rotate so row 0 is C rather than A.
    let shift = 3 * (n_chroma / 12);
    let mut rolled = Array2::<f32>::zeros((n_chroma, n_fft / 2 + 1));
    for c in 0..n_chroma {
        let source = (c + shift) % n_chroma;
        for k in 0..=n_fft / 2 {
            rolled[[c, k]] = weights[[source, k]];
        }
    }
    rolled
}

/// Power to decibels relative to 1.0, floored at `max - 80 dB`.
pub fn power_to_db(power: &Array2<f32>) -> Array2<f32> {
    let db = power.mapv(|p| 10.0 * p.max(AMIN).log10());
    let floor = db.iter().copied().fold(f32::MIN, f32::max) - TOP_DB;
    db.mapv(|v| v.max(floor))
}

/// Orthonormal DCT-II along the rows of `input`, keeping the first `n_out` rows.
pub fn dct_ortho(input: &Array2<f32>, n_out: usize) -> Array2<f32> {
    let n = input.nrows();
    let basis = Array2::from_shape_fn((n_out, n), |(k, i)| {
        let scale = if k == 0 {
            (1.0 / n as f32).sqrt()
        } else {
            (2.0 / n as f32).sqrt()
        };
        scale * (PI * k as f32 * (2 * i + 1) as f32 / (2 * n) as f32).cos()
    });
    basis.dot(input)
}

/// Normalises every column by its largest magnitude; silent columns stay as they are.
pub fn normalize_columns_max(input: &mut Array2<f32>) {
    for mut column in input.axis_iter_mut(Axis(1)) {
        let max = column.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        if max > f32::MIN_POSITIVE {
            column.mapv_inplace(|v| v / max);
        }
    }
}
