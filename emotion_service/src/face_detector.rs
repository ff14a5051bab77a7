use crate::{config::FaceDetectorConfig, region::BoundingBox};
use image::DynamicImage;
use std::{fs::File, io::BufReader, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceLocatorError {
    #[error("Failed to load face detector model {path}: {source}")]
    ModelLoad {
        path: String,
        source: std::io::Error,
    },
    #[error("Face detection failed: {0}")]
    Detection(String),
}

/// Finds faces in a decoded image.
///
/// Boxes are the detector's tight boxes, in the order the detector reports
/// them. Implementations must be shareable between concurrent requests.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, FaceLocatorError>;
}

/// SeetaFace frontal detector from the `rustface` crate.
pub struct RustfaceLocator {
    model: rustface::Model,
    min_face_size: u32,
    score_thresh: f64,
    pyramid_scale_factor: f32,
    slide_window_step: u32,
}

impl RustfaceLocator {
    pub fn from_file(path: &Path, config: &FaceDetectorConfig) -> Result<Self, FaceLocatorError> {
        let load_err = |source| FaceLocatorError::ModelLoad {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(load_err)?;
        let model = rustface::read_model(BufReader::new(file)).map_err(load_err)?;

        tracing::info!("Loaded face detector model from {}", path.display());

        Ok(Self {
            model,
            min_face_size: config.min_face_size,
            score_thresh: config.score_thresh,
            pyramid_scale_factor: config.pyramid_scale_factor,
            slide_window_step: config.slide_window_step,
        })
    }
}

impl FaceLocator for RustfaceLocator {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, FaceLocatorError> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();

        // The detector keeps per-scan state, so each call gets its own instance.
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(self.score_thresh);
        detector.set_pyramid_scale_factor(self.pyramid_scale_factor);
        detector.set_slide_window_step(self.slide_window_step, self.slide_window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let w = i32::try_from(bbox.width())
                    .map_err(|e| FaceLocatorError::Detection(e.to_string()))?;
                let h = i32::try_from(bbox.height())
                    .map_err(|e| FaceLocatorError::Detection(e.to_string()))?;
                tracing::debug!(
                    "Face at ({}, {}, {}, {}) score={:.3}",
                    bbox.x(),
                    bbox.y(),
                    w,
                    h,
                    face.score()
                );
                Ok(BoundingBox::new(bbox.x(), bbox.y(), w, h))
            })
            .collect()
    }
}
