//! Frame-level acoustic features for the audio classifier.
//!
//! A clip becomes a `(59, frames)` matrix: 40 MFCCs, 12 chroma bins and 7
//! spectral-contrast bands, all computed from one centred STFT
//! (`n_fft = 2048`, `hop = 512`, periodic Hann window, zero padding).
//! The frame axis is then padded or truncated to the model's fixed width.
//! Chroma bins follow the tuning estimated from each clip unless a fixed
//! tuning is configured.

use super::{filters, resample, tuning, AudioClip};
use crate::config::AudioFeaturesConfig;
use ndarray::{concatenate, s, Array2, Array4, Axis};
use parking_lot::Mutex;
use realfft::{RealFftPlanner, RealToComplex};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const N_MELS: usize = 128;
pub const N_MFCC: usize = 40;
pub const N_CHROMA: usize = 12;
pub const N_CONTRAST_BANDS: usize = 6;
const CONTRAST_FMIN: f32 = 200.0;
const CONTRAST_QUANTILE: f32 = 0.02;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Audio clip is empty")]
    EmptyAudio,
    #[error("Resampling failed: {0}")]
    Resample(String),
    #[error("FFT failed: {0}")]
    Fft(String),
    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
    #[error("Unexpected feature shape: {0}")]
    Shape(String),
}

/// Rows `start..rows_end` of the magnitude spectrogram feed one contrast band;
/// peak and valley are the means of the `quantile_count` largest and smallest values.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ContrastBand {
    start: usize,
    rows_end: usize,
    quantile_count: usize,
}

pub struct FeatureExtractor {
    sample_rate: u32,
    max_frames: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    mel_basis: Array2<f32>,
    fixed_chroma: Option<Arc<Array2<f32>>>,
    /// Chroma filterbanks keyed by tuning in hundredths of a bin.
    chroma_banks: Mutex<HashMap<i32, Arc<Array2<f32>>>>,
    contrast_bands: Vec<ContrastBand>,
}

impl FeatureExtractor {
    pub fn new(features_config: &AudioFeaturesConfig) -> Result<Self, FeatureError> {
        if features_config.sample_rate == 0 {
            return Err(FeatureError::InvalidConfig("sample_rate must be positive".to_string()));
        }
        if features_config.max_frames == 0 {
            return Err(FeatureError::InvalidConfig("max_frames must be positive".to_string()));
        }

        let sample_rate = features_config.sample_rate as f32;
        let mut planner = RealFftPlanner::<f32>::new();

        Ok(Self {
            sample_rate: features_config.sample_rate,
            max_frames: features_config.max_frames,
            window: filters::hann_window(N_FFT),
            fft: planner.plan_fft_forward(N_FFT),
            mel_basis: filters::mel_filterbank(sample_rate, N_FFT, N_MELS),
            fixed_chroma: features_config
                .chroma_tuning
                .map(|t| Arc::new(filters::chroma_filterbank(sample_rate, N_FFT, N_CHROMA, t))),
            chroma_banks: Mutex::new(HashMap::new()),
            contrast_bands: contrast_bands(sample_rate)?,
        })
    }

    pub fn feature_count(&self) -> usize {
        N_MFCC + N_CHROMA + N_CONTRAST_BANDS + 1
    }

    /// Chroma filterbank for the clip's power spectrogram.
    fn chroma_basis(&self, power: &Array2<f32>) -> Arc<Array2<f32>> {
        if let Some(basis) = &self.fixed_chroma {
            return Arc::clone(basis);
        }
        let sample_rate = self.sample_rate as f32;
        let estimate = tuning::estimate_tuning(power, sample_rate, N_FFT, N_CHROMA);
        let key = (estimate / tuning::TUNING_RESOLUTION).round() as i32;
        tracing::debug!("Estimated chroma tuning {:.2}", estimate);

        let mut banks = self.chroma_banks.lock();
        Arc::clone(banks.entry(key).or_insert_with(|| {
            let offset = key as f32 * tuning::TUNING_RESOLUTION;
            Arc::new(filters::chroma_filterbank(sample_rate, N_FFT, N_CHROMA, offset))
        }))
    }

    /// Magnitude spectrogram, `(n_fft / 2 + 1, 1 + len / hop)`.
    pub fn spectrogram(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        if samples.is_empty() {
            return Err(FeatureError::EmptyAudio);
        }

        let pad = N_FFT / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = 1 + samples.len() / HOP_LENGTH;
        let n_bins = N_FFT / 2 + 1;
        let mut magnitude = Array2::<f32>::zeros((n_bins, n_frames));

        let mut fft_input = self.fft.make_input_vec();
        let mut fft_output = self.fft.make_output_vec();
        for frame in 0..n_frames {
            let start = frame * HOP_LENGTH;
            for ((slot, &sample), &w) in fft_input
                .iter_mut()
                .zip(&padded[start..start + N_FFT])
                .zip(&self.window)
            {
                *slot = sample * w;
            }
            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;
            for (bin, value) in fft_output.iter().enumerate() {
                magnitude[[bin, frame]] = value.norm();
            }
        }

        Ok(magnitude)
    }

    /// Stacks MFCC, chroma and spectral contrast into `(feature_count, frames)`.
    pub fn features(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        let magnitude = self.spectrogram(samples)?;
        let power = magnitude.mapv(|m| m * m);

        let mel = self.mel_basis.dot(&power);
        let mfcc = filters::dct_ortho(&filters::power_to_db(&mel), N_MFCC);

        let mut chroma = self.chroma_basis(&power).dot(&power);
        filters::normalize_columns_max(&mut chroma);

        let contrast = self.spectral_contrast(&magnitude);

        concatenate(Axis(0), &[mfcc.view(), chroma.view(), contrast.view()])
            .map_err(|e| FeatureError::Shape(e.to_string()))
    }

    /// Resamples the clip, extracts features and shapes them as the model input
    /// `(1, max_frames, feature_count, 1)`.
    pub fn extract(&self, clip: &AudioClip) -> Result<Array4<f32>, FeatureError> {
        if clip.samples.is_empty() {
            return Err(FeatureError::EmptyAudio);
        }
        let samples = resample(&clip.samples, clip.sample_rate, self.sample_rate)?;
        let features = self.features(&samples)?;
        tracing::debug!(
            "Extracted {} frames of {} features",
            features.ncols(),
            features.nrows()
        );
        to_model_input(&fit_frames(&features, self.max_frames))
    }

    fn spectral_contrast(&self, magnitude: &Array2<f32>) -> Array2<f32> {
        let n_frames = magnitude.ncols();
        let n_rows = self.contrast_bands.len();
        let mut peak = Array2::<f32>::zeros((n_rows, n_frames));
        let mut valley = Array2::<f32>::zeros((n_rows, n_frames));

        let mut column = Vec::new();
        for (k, band) in self.contrast_bands.iter().enumerate() {
            for frame in 0..n_frames {
                column.clear();
                column.extend(magnitude.slice(s![band.start..band.rows_end, frame]).iter().copied());
                column.sort_by(f32::total_cmp);

                let (low, high) = quantile_means(&column, band.quantile_count);
                valley[[k, frame]] = low;
                peak[[k, frame]] = high;
            }
        }

        filters::power_to_db(&peak) - filters::power_to_db(&valley)
    }
}

/// Means of the `count` smallest and `count` largest values of a sorted,
/// non-empty slice. `count` is capped at the slice length.
fn quantile_means(sorted: &[f32], count: usize) -> (f32, f32) {
    let q = count.clamp(1, sorted.len());
    let low = sorted[..q].iter().sum::<f32>() / q as f32;
    let high = sorted[sorted.len() - q..].iter().sum::<f32>() / q as f32;
    (low, high)
}

/// Octave bands starting at 200 Hz, plus one band below and one open band on top.
fn contrast_bands(sample_rate: f32) -> Result<Vec<ContrastBand>, FeatureError> {
    let freqs = filters::fft_frequencies(sample_rate, N_FFT);
    let n_bins = freqs.len();

    let mut edges = vec![0.0f32];
    edges.extend((0..=N_CONTRAST_BANDS).map(|i| CONTRAST_FMIN * 2f32.powi(i as i32)));

    let mut bands = Vec::with_capacity(N_CONTRAST_BANDS + 1);
    for k in 0..=N_CONTRAST_BANDS {
        let (low, high) = (edges[k], edges[k + 1]);
        let first = freqs.iter().position(|&f| f >= low);
        let last = freqs.iter().rposition(|&f| f >= low && f <= high);
        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(FeatureError::InvalidConfig(format!(
                    "no fft bins between {} Hz and {} Hz at {} Hz",
                    low, high, sample_rate
                )))
            }
        };

        // Each band also takes the bin just below it; the top band runs to Nyquist.
        let start = if k > 0 { first.saturating_sub(1) } else { first };
        let end = if k == N_CONTRAST_BANDS { n_bins } else { last + 1 };
        // Lower bands leave their last bin to the next one.
        let rows_end = if k < N_CONTRAST_BANDS { end - 1 } else { end };
        if rows_end <= start {
            return Err(FeatureError::InvalidConfig(format!(
                "contrast band {} is empty at {} Hz",
                k, sample_rate
            )));
        }

        let quantile_count =
            ((CONTRAST_QUANTILE * (end - start) as f32).round_ties_even() as usize).max(1);
        bands.push(ContrastBand {
            start,
            rows_end,
            quantile_count,
        });
    }

    Ok(bands)
}

/// Truncates to the first `max_frames` frames or pads silence on the right.
pub fn fit_frames(features: &Array2<f32>, max_frames: usize) -> Array2<f32> {
    let (rows, cols) = features.dim();
    let mut fitted = Array2::<f32>::zeros((rows, max_frames));
    let keep = cols.min(max_frames);
    fitted
        .slice_mut(s![.., ..keep])
        .assign(&features.slice(s![.., ..keep]));
    fitted
}

/// `(features, frames)` to `(1, frames, features, 1)`.
pub fn to_model_input(features: &Array2<f32>) -> Result<Array4<f32>, FeatureError> {
    let (count, frames) = features.dim();
    features
        .t()
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((1, frames, count, 1))
        .map_err(|e| FeatureError::Shape(e.to_string()))
}
