mod error;
mod health;
mod metrics;
mod process_audio;
mod visual_emotion;

pub use error::ApiError;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/visualemotion/", post(visual_emotion::visual_emotion))
        .route("/visualemotion", post(visual_emotion::visual_emotion))
        .route("/process_audio/", post(process_audio::process_audio))
        .route("/process_audio", post(process_audio::process_audio))
}

#[cfg(test)]
mod tests {
    use crate::{
        audio::{AudioClip, AudioSource, FeatureExtractor},
        config::{AudioFeaturesConfig, FaceMarginConfig, ImageConfig},
        face_detector::FaceLocator,
        pipeline::{
            fakes::{FailingSource, FixedClassifier, FixedLocator, FixedSource},
            AudioEmotionPipeline, VisualEmotionPipeline,
        },
        region::BoundingBox,
        server::{build_router, SharedState},
        telemetry::Metrics,
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use serde_json::Value;
    use std::{io::Cursor, sync::Arc};
    use tower::ServiceExt;

    const BOUNDARY: &str = "emotion-test-boundary";
    const LABELS: [&str; 8] = [
        "angry", "calm", "disgust", "fearful", "happy", "neutral", "sad", "surprised",
    ];

    fn router(locator: impl FaceLocator + 'static, source: impl AudioSource + 'static) -> Router {
        limited_router(locator, source, 10 * 1024 * 1024)
    }

    fn limited_router(
        locator: impl FaceLocator + 'static,
        source: impl AudioSource + 'static,
        max_upload_bytes: usize,
    ) -> Router {
        let classifier = Arc::new(FixedClassifier::new(vec![
            0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.3, 0.1,
        ]));
        let visual = VisualEmotionPipeline::new(
            Arc::new(locator),
            classifier.clone(),
            FaceMarginConfig::default(),
            ImageConfig::default(),
        );
        let extractor = FeatureExtractor::new(&AudioFeaturesConfig::default()).unwrap();
        let audio = AudioEmotionPipeline::new(Arc::new(source), extractor, classifier);

        let state = SharedState {
            visual: Arc::new(visual),
            audio: Arc::new(audio),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        build_router(state, max_upload_bytes)
    }

    fn one_face() -> Router {
        router(
            FixedLocator(vec![BoundingBox::new(250, 150, 100, 120)]),
            FixedSource(AudioClip::new(vec![0.1; 48_000], 48_000)),
        )
    }

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(640, 480, Rgb([200, 180, 160])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn upload(uri: &str, field: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = one_face()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "Available");
    }

    #[tokio::test]
    async fn test_visual_emotion_for_one_face() {
        let response = one_face()
            .oneshot(upload("/visualemotion/", "image", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["message"], "Visual emotion processing successful!");
        assert_eq!(body["faces"], serde_json::json!([[170, 70, 250, 220]]));
        assert_eq!(body["faces_emotions"], serde_json::json!(["sad"]));
        let confidence = body["confidence"][0].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[tokio::test]
    async fn test_arrays_have_equal_length() {
        let app = router(
            FixedLocator(vec![
                BoundingBox::new(100, 100, 60, 60),
                BoundingBox::new(5_000, 5_000, 60, 60),
                BoundingBox::new(400, 200, 60, 60),
            ]),
            FixedSource(AudioClip::new(vec![0.0; 10], 48_000)),
        );
        let body = json(app.oneshot(upload("/visualemotion", "image", &png())).await.unwrap()).await;

        let faces = body["faces"].as_array().unwrap().len();
        assert_eq!(faces, 2);
        assert_eq!(body["faces_emotions"].as_array().unwrap().len(), faces);
        assert_eq!(body["confidence"].as_array().unwrap().len(), faces);
        for label in body["faces_emotions"].as_array().unwrap() {
            assert!(LABELS.contains(&label.as_str().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_no_faces_is_success() {
        let app = router(FixedLocator(Vec::new()), FailingSource);
        let response = app
            .oneshot(upload("/visualemotion/", "image", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["message"], "No faces detected in the image.");
        assert_eq!(body["faces"], serde_json::json!([]));
        assert_eq!(body["faces_emotions"], serde_json::json!([]));
        assert_eq!(body["confidence"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_corrupt_image_is_decode_error() {
        let response = one_face()
            .oneshot(upload("/visualemotion/", "image", b"\x00\x01 not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(response).await;
        assert_eq!(body["kind"], "decode_error");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_field_is_decode_error() {
        let response = one_face()
            .oneshot(upload("/visualemotion/", "file", &png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(response).await["kind"], "decode_error");

        let response = one_face()
            .oneshot(
                Request::post("/visualemotion/")
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(Body::from(png()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(response).await["kind"], "decode_error");
    }

    #[tokio::test]
    async fn test_process_audio() {
        for uri in ["/process_audio/", "/process_audio"] {
            let response = one_face()
                .oneshot(Request::post(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = json(response).await;
            assert_eq!(body["message"], "Audio processing successful!");
            assert_eq!(body["audio_emotion"], "sad");
            assert!((0.0..=1.0).contains(&body["confidence"].as_f64().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_process_audio_ignores_body() {
        let response = one_face()
            .oneshot(Request::post("/process_audio/").body(Body::from("RIFF....")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_process_audio_ignores_body_over_upload_limit() {
        let app = limited_router(
            FixedLocator(Vec::new()),
            FixedSource(AudioClip::new(vec![0.1; 48_000], 48_000)),
            16,
        );
        let body = vec![0u8; 1024];
        let response = app
            .oneshot(
                Request::post("/process_audio/")
                    .header(header::CONTENT_LENGTH, body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["audio_emotion"], "sad");
    }

    #[tokio::test]
    async fn test_capture_failure_is_reported() {
        let app = router(FixedLocator(Vec::new()), FailingSource);
        let response = app
            .oneshot(Request::post("/process_audio/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(response).await;
        assert_eq!(body["kind"], "audio_capture_error");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let response = one_face()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/visualemotion/")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = one_face();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
