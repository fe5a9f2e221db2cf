// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Drawing detections onto images.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detector::Detection;
use crate::download::download_file;

/// Assets URL for downloading fonts.
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Box outline thickness in pixels.
const BOX_THICKNESS: i32 = 3;

/// Label text height in pixels.
const LABEL_SCALE: f32 = 16.0;

/// Ultralytics Color Palette
pub const COLORS: [[u8; 3]; 20] = [
    [4, 42, 255],    // #042aff
    [11, 219, 235],  // #0bdbeb
    [243, 243, 243], // #f3f3f3
    [0, 223, 183],   // #00dfb7
    [17, 31, 104],   // #111f68
    [255, 111, 221], // #ff6fdd
    [255, 68, 79],   // #ff444f
    [204, 237, 0],   // #cced00
    [0, 243, 68],    // #00f344
    [189, 0, 255],   // #bd00ff
    [0, 180, 255],   // #00b4ff
    [221, 0, 186],   // #dd00ba
    [0, 255, 255],   // #00ffff
    [38, 192, 0],    // #26c000
    [1, 255, 179],   // #01ffb3
    [125, 36, 255],  // #7d24ff
    [123, 0, 104],   // #7b0068
    [255, 27, 108],  // #ff1b6c
    [252, 109, 47],  // #fc6d2f
    [162, 255, 11],  // #a2ff0b
];

/// Get color for a class ID.
#[must_use]
pub const fn get_class_color(class_id: usize) -> Rgb<u8> {
    Rgb(COLORS[class_id % COLORS.len()])
}

/// Find the font locally or download it into the Ultralytics config directory.
///
/// Returns `None` when the font is unavailable; labels are then skipped.
#[must_use]
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy().into_owned();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(&font_name);

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        tracing::warn!(dir = %config_dir.display(), error = %e, "failed to create config directory");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    match download_file(&url, &font_path) {
        Ok(()) => Some(font_path),
        Err(e) => {
            tracing::warn!(%url, error = %e, "font unavailable, labels will not be drawn");
            None
        }
    }
}

fn load_font(names: &HashMap<usize, String>) -> Option<FontArc> {
    let font_name = if names.values().all(|name| name.is_ascii()) {
        "Arial.ttf"
    } else {
        "Arial.Unicode.ttf"
    };

    let data = fs::read(check_font(font_name)?).ok()?;
    FontArc::try_from_vec(data).ok()
}

/// Renders detection boxes and labels.
///
/// The label font is resolved the first time a frame actually has detections,
/// so frames without detections never touch the network or the filesystem.
#[derive(Debug, Clone, Default)]
pub struct Annotator {
    font: OnceLock<Option<FontArc>>,
}

impl Annotator {
    /// Create an annotator that resolves its font lazily.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an annotator that draws boxes only.
    #[must_use]
    pub fn without_font() -> Self {
        Self {
            font: OnceLock::from(None),
        }
    }

    /// Draw detections onto a copy of `image`.
    ///
    /// With no detections the returned image is an unmodified clone, pixel
    /// format included.
    #[must_use]
    pub fn render(
        &self,
        image: &DynamicImage,
        detections: &[Detection],
        names: &HashMap<usize, String>,
    ) -> DynamicImage {
        if detections.is_empty() {
            return image.clone();
        }

        let font = self.font.get_or_init(|| load_font(names)).as_ref();
        let mut img = image.to_rgb8();
        for detection in detections {
            draw_detection(&mut img, detection, names, font);
        }

        DynamicImage::ImageRgb8(img)
    }
}

/// Draw one box and its `"<class> <conf>"` label.
fn draw_detection(
    img: &mut RgbImage,
    detection: &Detection,
    names: &HashMap<usize, String>,
    font: Option<&FontArc>,
) {
    let (width, height) = (img.width() as i32, img.height() as i32);
    if width == 0 || height == 0 {
        return;
    }

    let [bx1, by1, bx2, by2] = detection.bbox.map(|v| v.round() as i32);
    let (x1, x2) = (bx1.min(bx2).clamp(0, width - 1), bx1.max(bx2).clamp(0, width - 1));
    let (y1, y2) = (by1.min(by2).clamp(0, height - 1), by1.max(by2).clamp(0, height - 1));

    if x2 <= x1 || y2 <= y1 {
        return;
    }

    let color = get_class_color(detection.class_id);

    for t in 0..BOX_THICKNESS {
        let tx1 = (x1 + t).min(x2);
        let ty1 = (y1 + t).min(y2);
        let tx2 = (x2 - t).max(tx1);
        let ty2 = (y2 - t).max(ty1);
        if tx2 > tx1 && ty2 > ty1 {
            let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
            draw_hollow_rect_mut(img, rect, color);
        }
    }

    let Some(font) = font else {
        return;
    };

    let class_name = names.get(&detection.class_id).map_or("object", String::as_str);
    let label = format!("{class_name} {:.2}", detection.confidence);

    // Above the box if there's room, otherwise below
    let text_y = if y1 > 20 { y1 - 20 } else { y2 + 5 };
    if text_y < height {
        draw_text_mut(img, color, x1, text_y, PxScale::from(LABEL_SCALE), font, &label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn names() -> HashMap<usize, String> {
        HashMap::from([(0, "person".to_string())])
    }

    #[test]
    fn test_class_color_wraps() {
        assert_eq!(get_class_color(0), Rgb(COLORS[0]));
        assert_eq!(get_class_color(COLORS.len() + 3), Rgb(COLORS[3]));
    }

    #[test]
    fn test_no_detections_is_identity() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4])));
        let rendered = Annotator::without_font().render(&image, &[], &names());
        assert_eq!(rendered, image);
    }

    #[test]
    fn test_box_outline_drawn() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([0, 0, 0])));
        let detections = [Detection::new([10.0, 10.0, 50.0, 50.0], 0.9, 0)];
        let rendered = Annotator::without_font()
            .render(&image, &detections, &names())
            .to_rgb8();

        assert_eq!(*rendered.get_pixel(10, 30), get_class_color(0));
        assert_eq!(*rendered.get_pixel(12, 30), get_class_color(0));
        assert_eq!(*rendered.get_pixel(30, 30), Rgb([0, 0, 0]));
        assert_eq!(rendered.dimensions(), (64, 64));
    }

    #[test]
    fn test_degenerate_box_skipped() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([9, 9, 9])));
        let detections = [Detection::new([5.0, 5.0, 5.0, 12.0], 0.9, 0)];
        let rendered = Annotator::without_font()
            .render(&image, &detections, &names())
            .to_rgb8();
        assert!(rendered.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }
}
