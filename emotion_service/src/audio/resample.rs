use super::FeatureError;
use rubato::{FftFixedIn, Resampler};

const CHUNK_FRAMES: usize = 1024;

/// Resamples a mono waveform from `from_rate` to `to_rate`.
///
/// The resampler's delay is trimmed so the output lines up with the input and
/// holds `ceil(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, FeatureError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        2,
        1,
    )
    .map_err(|e| FeatureError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

    let mut chunks = samples.chunks_exact(CHUNK_FRAMES);
    for chunk in &mut chunks {
        let resampled = resampler
            .process(&[chunk][..], None)
            .map_err(|e| FeatureError::Resample(e.to_string()))?;
        output.extend_from_slice(&resampled[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let resampled = resampler
            .process_partial(Some(&[remainder][..]), None)
            .map_err(|e| FeatureError::Resample(e.to_string()))?;
        output.extend_from_slice(&resampled[0]);
    }

    // Flush the tail still held back by the resampler.
    while output.len() < expected + delay {
        let resampled = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| FeatureError::Resample(e.to_string()))?;
        if resampled[0].is_empty() {
            break;
        }
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}
