mod audio;
mod visual;

pub use audio::AudioEmotionPipeline;
pub use visual::{FaceEmotion, FrameResult, VisualEmotionPipeline};

use crate::{
    audio::{AudioCaptureError, FeatureError},
    face_detector::FaceLocatorError,
    model_service::InferenceError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Face detection failed: {0}")]
    FaceLocator(#[from] FaceLocatorError),
    #[error("Model inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Audio capture failed: {0}")]
    AudioCapture(#[from] AudioCaptureError),
    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(#[from] FeatureError),
}

impl PipelineError {
    /// Stable machine-readable error category.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "decode_error",
            PipelineError::FaceLocator(_) | PipelineError::Inference(_) => "model_inference_error",
            PipelineError::Io(_) => "io_error",
            PipelineError::AudioCapture(_) => "audio_capture_error",
            PipelineError::FeatureExtraction(_) => "feature_extraction_error",
        }
    }
}
