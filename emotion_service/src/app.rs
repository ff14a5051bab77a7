use crate::{
    audio::{AudioSource, FeatureExtractor, MicrophoneSource, WavFileSource, WavSink},
    config::Config,
    crop_sink::DirCropSink,
    face_detector::RustfaceLocator,
    ort_service::OrtEmotionClassifier,
    pipeline::{AudioEmotionPipeline, VisualEmotionPipeline},
    provisioning::ensure_model,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let models = &config.models;
    let face_detector_path = ensure_model(models, &models.face_detector.source()).await?;
    let image_model_path = ensure_model(models, &models.image_classifier.source()).await?;
    let audio_model_path = ensure_model(models, &models.audio_classifier.source()).await?;

    let locator = match RustfaceLocator::from_file(&face_detector_path, &models.face_detector) {
        Ok(locator) => Arc::new(locator),
        Err(e) => {
            tracing::error!("Failed to load face detector: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let image_classifier = match OrtEmotionClassifier::new(
        "image_classifier",
        &image_model_path,
        &models.image_classifier,
    ) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to initialize image classifier: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let audio_classifier = match OrtEmotionClassifier::new(
        "audio_classifier",
        &audio_model_path,
        &models.audio_classifier,
    ) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to initialize audio classifier: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let mut visual = VisualEmotionPipeline::new(
        locator,
        image_classifier,
        config.face_margin,
        config.image.clone(),
    );
    if let Some(crop_dir) = &config.artifacts.crop_dir {
        tracing::info!("Saving face crops to {:?}", crop_dir);
        visual = visual.with_crop_sink(Arc::new(DirCropSink::new(crop_dir)));
    }

    let source: Arc<dyn AudioSource> = match &config.recording.replay_file {
        Some(path) => {
            tracing::warn!("Replaying {:?} instead of recording from a microphone", path);
            Arc::new(WavFileSource::new(path))
        }
        None => Arc::new(MicrophoneSource::new(&config.recording)),
    };
    let extractor = FeatureExtractor::new(&config.audio_features)?;
    let audio = AudioEmotionPipeline::new(source, extractor, audio_classifier)
        .with_wav_sink(WavSink::new(&config.artifacts));

    let state = SharedState {
        visual: Arc::new(visual),
        audio: Arc::new(audio),
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
