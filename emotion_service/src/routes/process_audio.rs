use super::ApiError;
use crate::{emotion::Emotion, server::SharedState};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "process_audio";

#[derive(Debug, Serialize)]
pub struct AudioEmotionResponse {
    message: &'static str,
    audio_emotion: Emotion,
    confidence: f32,
}

/// Records from the server's own input device. The request body is never
/// read, so the upload limit does not apply here.
#[instrument(skip_all)]
pub async fn process_audio(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<AudioEmotionResponse>, ApiError> {
    state.metrics.record_request(ROUTE);
    let body_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0);
    if body_len > 0 {
        tracing::warn!(
            "Ignoring {} byte request body, audio is recorded on the server",
            body_len
        );
    }

    let started = Instant::now();
    let pipeline = state.audio.clone();
    let emotion = tokio::task::spawn_blocking(move || pipeline.analyze()).await??;
    state
        .metrics
        .record_inference_duration(started.elapsed().as_millis() as u64, ROUTE);

    Ok(Json(AudioEmotionResponse {
        message: "Audio processing successful!",
        audio_emotion: emotion.label,
        confidence: emotion.confidence,
    }))
}
