mod capture;
mod features;
mod filters;
mod resample;
mod tuning;
mod wav;

pub use capture::MicrophoneSource;
pub use features::{FeatureError, FeatureExtractor};
pub use resample::resample;
pub use wav::{read_wav, WavFileSource, WavSink};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioCaptureError {
    #[error("No input device available: {0}")]
    NoDevice(String),
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Mono waveform with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Produces the clip the audio pipeline classifies. Capturing blocks for
/// the length of the recording.
pub trait AudioSource: Send + Sync {
    fn capture(&self) -> Result<AudioClip, AudioCaptureError>;
}
