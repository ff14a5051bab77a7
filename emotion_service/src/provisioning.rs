use crate::config::{ModelSource, ModelsConfig, Provisioning};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Model file not found: {0:?}")]
    Missing(PathBuf),
    #[error("Model file {0:?} is missing and no download url is configured")]
    NoUrl(PathBuf),
    #[error("Failed to download model from {url}: {source}")]
    Download { url: String, source: reqwest::Error },
    #[error("Failed to store model at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolves a model to a local file, downloading it first when the
/// provisioning strategy allows it.
pub async fn ensure_model(
    models: &ModelsConfig,
    source: &ModelSource,
) -> Result<PathBuf, ProvisionError> {
    let path = models.get_path(source);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(path);
    }

    match models.provisioning {
        Provisioning::Local => Err(ProvisionError::Missing(path)),
        Provisioning::FetchOnMissing => {
            let url = source
                .url
                .as_deref()
                .ok_or_else(|| ProvisionError::NoUrl(path.clone()))?;
            download(url, &path).await?;
            Ok(path)
        }
    }
}

async fn download(url: &str, path: &Path) -> Result<(), ProvisionError> {
    tracing::info!("Downloading model {:?} from {}", path, url);
    let download_err = |source| ProvisionError::Download {
        url: url.to_string(),
        source,
    };
    let io_err = |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = reqwest::get(url)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(download_err)?
        .bytes()
        .await
        .map_err(download_err)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    // Write next to the target and rename, so a failed download never
    // leaves a truncated model behind.
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &bytes).await.map_err(io_err)?;
    tokio::fs::rename(&partial, path).await.map_err(io_err)?;

    tracing::info!("Stored {} bytes at {:?}", bytes.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, FaceDetectorConfig};
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    /// Serves `/image.onnx` and a `/gone.onnx` that always answers 404.
    async fn model_server() -> String {
        let app = Router::new()
            .route("/image.onnx", get(|| async { "onnx-weights" }))
            .route(
                "/gone.onnx",
                get(|| async { (StatusCode::NOT_FOUND, "not here") }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn models_config(dir: PathBuf, provisioning: Provisioning) -> ModelsConfig {
        let classifier = |file: &str| ClassifierConfig {
            file: file.to_string(),
            url: None,
            num_instances: 1,
            intra_threads: 1,
        };
        ModelsConfig {
            provisioning,
            model_dir: dir,
            face_detector: FaceDetectorConfig {
                file: "seeta.bin".to_string(),
                url: None,
                min_face_size: 20,
                score_thresh: 2.0,
                pyramid_scale_factor: 0.8,
                slide_window_step: 4,
            },
            image_classifier: classifier("image.onnx"),
            audio_classifier: classifier("audio.onnx"),
        }
    }

    #[tokio::test]
    async fn test_existing_file_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image.onnx"), b"onnx").unwrap();
        let models = models_config(dir.path().to_path_buf(), Provisioning::FetchOnMissing);

        let path = ensure_model(&models, &models.image_classifier.source())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("image.onnx"));
    }

    #[tokio::test]
    async fn test_local_provisioning_never_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let models = models_config(dir.path().to_path_buf(), Provisioning::Local);
        let mut source = models.audio_classifier.source();
        source.url = Some("http://127.0.0.1:9/audio.onnx".to_string());

        let result = ensure_model(&models, &source).await;
        assert!(matches!(result, Err(ProvisionError::Missing(_))));
    }

    #[tokio::test]
    async fn test_fetch_on_missing_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let models = models_config(dir.path().to_path_buf(), Provisioning::FetchOnMissing);

        let result = ensure_model(&models, &models.face_detector.source()).await;
        assert!(matches!(result, Err(ProvisionError::NoUrl(_))));
    }

    #[tokio::test]
    async fn test_missing_model_is_downloaded() {
        let base_url = model_server().await;
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("models");
        let models = models_config(model_dir.clone(), Provisioning::FetchOnMissing);
        let mut source = models.image_classifier.source();
        source.url = Some(format!("{}/image.onnx", base_url));

        let path = ensure_model(&models, &source).await.unwrap();
        assert_eq!(path, model_dir.join("image.onnx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"onnx-weights");
        assert!(!model_dir.join("image.part").exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let base_url = model_server().await;
        let dir = tempfile::tempdir().unwrap();
        let models = models_config(dir.path().to_path_buf(), Provisioning::FetchOnMissing);
        let mut source = models.image_classifier.source();
        source.url = Some(format!("{}/gone.onnx", base_url));

        let result = ensure_model(&models, &source).await;
        match result {
            Err(ProvisionError::Download { url, source }) => {
                assert!(url.ends_with("/gone.onnx"));
                assert_eq!(source.status(), Some(reqwest::StatusCode::NOT_FOUND));
            }
            other => panic!("expected a download error, got {:?}", other),
        }
        assert!(!dir.path().join("image.onnx").exists());
        assert!(!dir.path().join("image.part").exists());
    }
}
