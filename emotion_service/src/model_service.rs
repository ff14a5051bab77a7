use crate::emotion::{EmotionResult, ScoreError};
use ndarray::ArrayView4;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Failed to build input tensor: {0}")]
    Tensor(String),
    #[error("Inference failed: {0}")]
    Run(String),
    #[error("Failed to extract output tensor: {0}")]
    Output(String),
    #[error("Session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("Invalid model output: {0}")]
    Scores(#[from] ScoreError),
}

/// A pre-trained classifier mapping one input tensor to an emotion.
///
/// The input always carries a batch dimension of one. Loaded weights are
/// read-only, so implementations are shared across requests.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, input: ArrayView4<'_, f32>) -> Result<EmotionResult, InferenceError>;
}
