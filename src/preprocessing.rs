// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for YOLO inference.
//!
//! Letterbox resize (aspect-preserving scale plus centered gray padding),
//! normalization to [0, 1] and conversion to an NCHW tensor, together with the
//! inverse mapping from model space back to source pixels.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

/// Letterbox padding value (gray 114).
pub const LETTERBOX_COLOR: u8 = 114;

/// A preprocessed image and the transform that produced it.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Tensor in NCHW layout, shape `(1, 3, H, W)`, values in [0, 1].
    pub tensor: Array4<f32>,
    /// Original image dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

/// Letterbox an image into a `target_size` (height, width) tensor.
#[must_use]
pub fn preprocess_image(image: &DynamicImage, target_size: (usize, usize)) -> PreprocessResult {
    let (orig_width, orig_height) = image.dimensions();
    let (new_width, new_height, pad_left, pad_top, scale) =
        calculate_letterbox_params(orig_width, orig_height, target_size);

    let resized = imageops::resize(
        &image.to_rgb8(),
        new_width.max(1),
        new_height.max(1),
        FilterType::Triangle,
    );

    let (target_h, target_w) = target_size;
    let mut tensor = Array4::from_elem((1, 3, target_h, target_w), f32::from(LETTERBOX_COLOR) / 255.0);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = (y + pad_top) as usize;
        let tx = (x + pad_left) as usize;
        if ty >= target_h || tx >= target_w {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = f32::from(pixel[c]) / 255.0;
        }
    }

    PreprocessResult {
        tensor,
        orig_shape: (orig_height, orig_width),
        scale,
        padding: (pad_top as f32, pad_left as f32),
    }
}

/// Compute the scaled size and centered padding for a letterbox.
///
/// Returns `(new_width, new_height, pad_left, pad_top, (scale_y, scale_x))`.
fn calculate_letterbox_params(
    orig_width: u32,
    orig_height: u32,
    target_size: (usize, usize),
) -> (u32, u32, u32, u32, (f32, f32)) {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    let new_w = (orig_w * scale).round() as u32;
    let new_h = (orig_h * scale).round() as u32;

    let pad_left = (target_size.1 as u32).saturating_sub(new_w) / 2;
    let pad_top = (target_size.0 as u32).saturating_sub(new_h) / 2;

    (
        new_w,
        new_h,
        pad_left,
        pad_top,
        (new_h as f32 / orig_h, new_w as f32 / orig_w),
    )
}

/// Map `[x1, y1, x2, y2]` from letterboxed model space back to source pixels.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], scale: (f32, f32), padding: (f32, f32)) -> [f32; 4] {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;

    [
        (coords[0] - pad_left) / scale_x,
        (coords[1] - pad_top) / scale_y,
        (coords[2] - pad_left) / scale_x,
        (coords[3] - pad_top) / scale_y,
    ]
}

/// Clip `[x1, y1, x2, y2]` to an image of shape (height, width).
#[must_use]
pub const fn clip_coords(coords: &[f32; 4], shape: (u32, u32)) -> [f32; 4] {
    let (h, w) = (shape.0 as f32, shape.1 as f32);
    [
        coords[0].clamp(0.0, w),
        coords[1].clamp(0.0, h),
        coords[2].clamp(0.0, w),
        coords[3].clamp(0.0, h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_letterbox_params_square() {
        let (w, h, left, top, scale) = calculate_letterbox_params(640, 640, (640, 640));
        assert_eq!((w, h, left, top), (640, 640, 0, 0));
        assert!((scale.0 - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_letterbox_params_wide() {
        let (w, h, left, top, _) = calculate_letterbox_params(1280, 720, (640, 640));
        assert_eq!((w, h), (640, 360));
        assert_eq!((left, top), (0, 140));
    }

    #[test]
    fn test_preprocess_pads_with_gray() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 0, 0])));
        let result = preprocess_image(&image, (64, 64));

        assert_eq!(result.tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(result.orig_shape, (32, 64));
        assert!((result.padding.0 - 16.0).abs() < f32::EPSILON);

        let gray = f32::from(LETTERBOX_COLOR) / 255.0;
        assert!((result.tensor[[0, 0, 0, 0]] - gray).abs() < 1e-6);
        assert!((result.tensor[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);
        assert!(result.tensor[[0, 1, 32, 32]].abs() < 1e-6);
    }

    #[test]
    fn test_scale_and_clip_round_trip() {
        let scaled = scale_coords(&[0.0, 140.0, 640.0, 500.0], (0.5, 0.5), (140.0, 0.0));
        assert_eq!(scaled, [0.0, 0.0, 1280.0, 720.0]);

        let clipped = clip_coords(&[-5.0, 10.0, 700.0, 800.0], (720, 640));
        assert_eq!(clipped, [0.0, 10.0, 640.0, 720.0]);
    }
}
