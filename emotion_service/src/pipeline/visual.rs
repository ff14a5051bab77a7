use super::PipelineError;
use crate::{
    config::{FaceMarginConfig, ImageConfig},
    crop_sink::CropSink,
    emotion::EmotionResult,
    face_detector::FaceLocator,
    model_service::EmotionClassifier,
    preprocess,
    region::{clamp_region, BoundingBox},
};
use image::{DynamicImage, GenericImageView, ImageReader};
use std::{io::Cursor, sync::Arc};
use tracing::instrument;

/// One classified face: the margin-expanded box and its emotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceEmotion {
    pub bbox: BoundingBox,
    pub emotion: EmotionResult,
}

/// Classified faces in detector order. Empty when no usable face was found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameResult {
    pub faces: Vec<FaceEmotion>,
}

impl FrameResult {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

pub struct VisualEmotionPipeline {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    margin: FaceMarginConfig,
    image_config: ImageConfig,
    crop_sink: Option<Arc<dyn CropSink>>,
}

impl VisualEmotionPipeline {
    pub fn new(
        locator: Arc<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        margin: FaceMarginConfig,
        image_config: ImageConfig,
    ) -> Self {
        Self {
            locator,
            classifier,
            margin,
            image_config,
            crop_sink: None,
        }
    }

    pub fn with_crop_sink(mut self, crop_sink: Arc<dyn CropSink>) -> Self {
        self.crop_sink = Some(crop_sink);
        self
    }

    /// Decodes an uploaded image and classifies every face in it.
    ///
    /// Blocks for the duration of detection and inference.
    #[instrument(skip_all, fields(bytes = image_data.len()))]
    pub fn analyze(&self, image_data: &[u8]) -> Result<FrameResult, PipelineError> {
        let image = decode(image_data)?;
        let (width, height) = image.dimensions();

        let boxes = self.locator.locate(&image)?;
        tracing::info!("Detected {} faces in {}x{} image", boxes.len(), width, height);

        let mut result = FrameResult::default();
        for detected in boxes {
            let bbox = detected.expand(&self.margin);
            let Some(region) = clamp_region(&bbox, width, height) else {
                tracing::warn!("Skipping face {:?}: no area left inside the image", bbox);
                continue;
            };

            let face = preprocess::crop(&image, &region);
            if let Some(sink) = &self.crop_sink {
                sink.save(&face, &region)?;
            }

            let input = preprocess::face_tensor(
                &face,
                self.image_config.input_size,
                self.image_config.channel_order,
            );
            let emotion = self.classifier.classify(input.view())?;
            tracing::debug!(
                "Face at {:?} is {} ({:.3})",
                bbox,
                emotion.label,
                emotion.confidence
            );

            result.faces.push(FaceEmotion { bbox, emotion });
        }

        Ok(result)
    }
}

fn decode(image_data: &[u8]) -> Result<DynamicImage, PipelineError> {
    ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))
}
