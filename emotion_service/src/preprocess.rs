use crate::{config::ChannelOrder, region::ClampedRegion};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};

pub fn crop(image: &DynamicImage, region: &ClampedRegion) -> DynamicImage {
    image.crop_imm(region.x0, region.y0, region.width(), region.height())
}

/// Resizes a face crop to `size` x `size` and lays it out as `(1, size, size, 3)`
/// with every channel scaled into `[0, 1]`.
pub fn face_tensor(face: &DynamicImage, size: u32, channel_order: ChannelOrder) -> Array<f32, Ix4> {
    let resized = face.resize_exact(size, size, FilterType::Triangle).to_rgb8();

    let side = size as usize;
    let mut input = Array::zeros((1, side, side, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match channel_order {
            ChannelOrder::Bgr => [b, g, r],
            ChannelOrder::Rgb => [r, g, b],
        };
        for (c, value) in ordered.into_iter().enumerate() {
            input[[0, y as usize, x as usize, c]] = (value as f32) / 255.;
        }
    }

    input
}
