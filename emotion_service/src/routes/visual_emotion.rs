use super::ApiError;
use crate::{emotion::Emotion, pipeline::FrameResult, server::SharedState};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use bytes::Bytes;
use serde::Serialize;
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "visual_emotion";
const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct VisualEmotionResponse {
    message: &'static str,
    faces: Vec<[i32; 4]>,
    faces_emotions: Vec<Emotion>,
    confidence: Vec<f32>,
}

impl From<FrameResult> for VisualEmotionResponse {
    fn from(result: FrameResult) -> Self {
        let message = if result.is_empty() {
            "No faces detected in the image."
        } else {
            "Visual emotion processing successful!"
        };

        let mut response = Self {
            message,
            faces: Vec::with_capacity(result.faces.len()),
            faces_emotions: Vec::with_capacity(result.faces.len()),
            confidence: Vec::with_capacity(result.faces.len()),
        };
        for face in result.faces {
            response.faces.push(face.bbox.to_array());
            response.faces_emotions.push(face.emotion.label);
            response.confidence.push(face.emotion.confidence);
        }
        response
    }
}

#[instrument(skip_all)]
pub async fn visual_emotion(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VisualEmotionResponse>, ApiError> {
    state.metrics.record_request(ROUTE);

    let mut multipart = multipart.map_err(|e| ApiError::decode(e.body_text()))?;
    let image_data = read_image_field(&mut multipart).await?;

    let started = Instant::now();
    let pipeline = state.visual.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.analyze(&image_data)).await??;
    state
        .metrics
        .record_inference_duration(started.elapsed().as_millis() as u64, ROUTE);
    state.metrics.record_faces(result.faces.len());

    Ok(Json(result.into()))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::decode(e.body_text()))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError::decode(e.body_text()));
        }
    }
    Err(ApiError::decode(format!(
        "Upload has no `{}` field",
        IMAGE_FIELD
    )))
}
