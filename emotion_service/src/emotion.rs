use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The closed set of emotion categories both classifiers were trained on.
///
/// Variant order is the label-encoding order: index `i` of a model's output
/// vector scores `Emotion::ALL[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Calm,
    Disgust,
    Fearful,
    Happy,
    Neutral,
    Sad,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Angry,
        Emotion::Calm,
        Emotion::Disgust,
        Emotion::Fearful,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprised,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Calm => "calm",
            Emotion::Disgust => "disgust",
            Emotion::Fearful => "fearful",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ScoreError {
    #[error("model returned no scores")]
    Empty,
    #[error("model returned {0} scores, expected at most {max}", max = Emotion::ALL.len())]
    TooManyClasses(usize),
    #[error("model returned a non-finite score")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionResult {
    pub label: Emotion,
    pub confidence: f32,
}

impl EmotionResult {
    /// Decodes one row of model output into a label and a confidence in `[0, 1]`.
    ///
    /// Scores that already form a probability distribution are used as-is,
    /// anything else (logits) goes through a softmax first.
    pub fn from_scores(scores: &[f32]) -> Result<Self, ScoreError> {
        if scores.is_empty() {
            return Err(ScoreError::Empty);
        }
        if scores.len() > Emotion::ALL.len() {
            return Err(ScoreError::TooManyClasses(scores.len()));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ScoreError::NonFinite);
        }

        let probabilities = if is_distribution(scores) {
            scores.to_vec()
        } else {
            softmax(scores)
        };

        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        let label = Emotion::from_index(index).ok_or(ScoreError::TooManyClasses(scores.len()))?;

        Ok(Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

fn is_distribution(scores: &[f32]) -> bool {
    let sum: f32 = scores.iter().sum();
    scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
