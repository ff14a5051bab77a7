//! Tuning offset of a clip relative to A440, used to centre the chroma bins.
//!
//! Spectral peaks between 150 Hz and 4 kHz are located per frame with
//! parabolic interpolation. The stronger half of them vote in a histogram of
//! their deviation from the nearest equal-tempered pitch.

use ndarray::{Array2, ArrayView1};

const PITCH_FMIN: f32 = 150.0;
const PITCH_FMAX: f32 = 4_000.0;
/// Peaks below this fraction of the frame maximum are ignored.
const PEAK_THRESHOLD: f32 = 0.1;
/// Histogram bin width, in fractions of a chroma bin.
pub const TUNING_RESOLUTION: f32 = 0.01;
/// C0, the reference for pitch classes.
const REFERENCE_HZ: f64 = 440.0 / 16.0;

/// Tuning deviation in `[-0.5, 0.5)` fractions of a chroma bin, estimated
/// from a power spectrogram of shape `(n_fft / 2 + 1, frames)`.
/// Returns 0.0 when the clip has no usable peaks.
pub fn estimate_tuning(
    power: &Array2<f32>,
    sample_rate: f32,
    n_fft: usize,
    bins_per_octave: usize,
) -> f32 {
    let peaks = track_peaks(power, sample_rate, n_fft);
    if peaks.is_empty() {
        return 0.0;
    }

    let mut magnitudes: Vec<f32> = peaks.iter().map(|&(_, mag)| mag).collect();
    let threshold = median(&mut magnitudes);
    let pitches: Vec<f32> = peaks
        .into_iter()
        .filter(|&(_, mag)| mag >= threshold)
        .map(|(pitch, _)| pitch)
        .collect();

    pitch_tuning(&pitches, bins_per_octave)
}

/// `(frequency, magnitude)` of every interpolated local maximum.
fn track_peaks(power: &Array2<f32>, sample_rate: f32, n_fft: usize) -> Vec<(f32, f32)> {
    let (n_bins, n_frames) = power.dim();
    let fmax = PITCH_FMAX.min(sample_rate / 2.0);
    let bin_hz = sample_rate / n_fft as f32;

    let mut peaks = Vec::new();
    for frame in 0..n_frames {
        let column = power.column(frame);
        let floor = PEAK_THRESHOLD * column.fold(0.0f32, |max, &v| max.max(v));
        let gated = |k: usize| if column[k] > floor { column[k] } else { 0.0 };

        for k in 1..n_bins {
            let freq = k as f32 * bin_hz;
            if freq < PITCH_FMIN || freq >= fmax {
                continue;
            }
            let here = gated(k);
            let next = if k + 1 < n_bins { gated(k + 1) } else { here };
            if !(here > gated(k - 1) && here >= next) {
                continue;
            }

            let shift = parabolic_shift(&column, k);
            let pitch = (k as f32 + shift) * bin_hz;
            if pitch > 0.0 {
                peaks.push((pitch, column[k] + 0.5 * slope(&column, k) * shift));
            }
        }
    }
    peaks
}

/// Offset in bins of the vertex of the parabola through `k - 1, k, k + 1`.
fn parabolic_shift(column: &ArrayView1<f32>, k: usize) -> f32 {
    if k == 0 || k + 1 >= column.len() {
        return 0.0;
    }
    let curvature = column[k + 1] + column[k - 1] - 2.0 * column[k];
    let tilt = 0.5 * (column[k + 1] - column[k - 1]);
    if tilt.abs() >= curvature.abs() {
        0.0
    } else {
        -tilt / curvature
    }
}

/// Central difference, one-sided at the edges.
fn slope(column: &ArrayView1<f32>, k: usize) -> f32 {
    let last = column.len() - 1;
    match k {
        0 => column[1] - column[0],
        k if k == last => column[last] - column[last - 1],
        k => 0.5 * (column[k + 1] - column[k - 1]),
    }
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Left edge of the most populated histogram bin of pitch deviations.
fn pitch_tuning(frequencies: &[f32], bins_per_octave: usize) -> f32 {
    let n_bins = (1.0 / TUNING_RESOLUTION).round() as usize;
    let mut counts = vec![0usize; n_bins];
    let mut voted = false;

    for &freq in frequencies.iter().filter(|&&f| f > 0.0) {
        let octaves = (freq as f64 / REFERENCE_HZ).log2();
        let mut residual = (bins_per_octave as f64 * octaves).rem_euclid(1.0);
        if residual >= 0.5 {
            residual -= 1.0;
        }
        let index = ((residual + 0.5) / TUNING_RESOLUTION as f64).floor() as usize;
        counts[index.min(n_bins - 1)] += 1;
        voted = true;
    }
    if !voted {
        return 0.0;
    }

    let best = counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
        .0;
    -0.5 + best as f32 * TUNING_RESOLUTION
}
