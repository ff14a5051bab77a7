use crate::config::FaceMarginConfig;
use serde::Serialize;

/// Raw face box in image pixels. After margin expansion it may start at
/// negative coordinates or extend past the image edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `[x, y, w, h]`, the wire form of a face box.
    pub fn to_array(&self) -> [i32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    pub fn expand(&self, margin: &FaceMarginConfig) -> Self {
        Self {
            x: self.x.saturating_sub(margin.left),
            y: self.y.saturating_sub(margin.top),
            width: self.width.saturating_add(margin.extra_width),
            height: self.height.saturating_add(margin.extra_height),
        }
    }
}

/// In-bounds crop rectangle, `0 <= x0 < x1 <= width` and `0 <= y0 < y1 <= height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedRegion {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl ClampedRegion {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Clamps a raw box to an image of `image_width` x `image_height` pixels.
///
/// Returns `None` when nothing of the box is left inside the image; such a
/// region must not reach the classifier.
pub fn clamp_region(
    bbox: &BoundingBox,
    image_width: u32,
    image_height: u32,
) -> Option<ClampedRegion> {
    let width = i64::from(image_width);
    let height = i64::from(image_height);

    let x0 = i64::from(bbox.x).max(0);
    let y0 = i64::from(bbox.y).max(0);
    let x1 = (i64::from(bbox.x) + i64::from(bbox.width)).min(width);
    let y1 = (i64::from(bbox.y) + i64::from(bbox.height)).min(height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(ClampedRegion {
        x0: x0 as u32,
        y0: y0 as u32,
        x1: x1 as u32,
        y1: y1 as u32,
    })
}
