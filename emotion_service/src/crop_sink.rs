use crate::region::ClampedRegion;
use image::DynamicImage;
use std::{io, path::PathBuf};

/// Receives every face crop before classification, for offline inspection.
pub trait CropSink: Send + Sync {
    fn save(&self, crop: &DynamicImage, region: &ClampedRegion) -> io::Result<()>;
}

/// Writes crops as `face_{x0}_{y0}.jpg` into one directory.
pub struct DirCropSink {
    dir: PathBuf,
}

impl DirCropSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, region: &ClampedRegion) -> PathBuf {
        self.dir.join(format!("face_{}_{}.jpg", region.x0, region.y0))
    }
}

impl CropSink for DirCropSink {
    fn save(&self, crop: &DynamicImage, region: &ClampedRegion) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(region);
        crop.to_rgb8()
            .save(&path)
            .map_err(|e| io::Error::other(format!("failed to write {:?}: {}", path, e)))?;
        tracing::debug!("Saved face crop to {:?}", path);
        Ok(())
    }
}
