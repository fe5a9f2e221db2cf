// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Single-image annotation: decode, detect, render, encode.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::annotate::Annotator;
use crate::config::DetectParams;
use crate::detector::{Detection, Detector};
use crate::error::{AnnotateError, Result};
use crate::utils::format_detection_summary;

/// An annotated still image.
#[derive(Debug, Clone)]
pub struct StillResult {
    /// Image with overlays drawn.
    pub image: DynamicImage,
    /// Detections drawn onto the image.
    pub detections: Vec<Detection>,
    /// Human-readable detection counts, e.g. "2 persons, 1 bus".
    pub summary: String,
}

/// Detect objects in `image` and draw them.
///
/// # Errors
///
/// Propagates detector errors unchanged.
pub fn annotate_image<D: Detector + ?Sized>(
    detector: &D,
    renderer: &Annotator,
    image: &DynamicImage,
    params: &DetectParams,
) -> Result<StillResult> {
    let detections = detector.detect(image, params)?;
    let summary = format_detection_summary(&detections, detector.names());
    let image = renderer.render(image, &detections, detector.names());

    Ok(StillResult {
        image,
        detections,
        summary,
    })
}

/// Decode an encoded image, annotate it and re-encode it as PNG.
///
/// # Errors
///
/// Returns [`AnnotateError::SourceUnreadable`] if `bytes` is not a decodable
/// image, and propagates detector and encoder errors.
pub fn annotate_bytes<D: Detector + ?Sized>(
    detector: &D,
    renderer: &Annotator,
    bytes: &[u8],
    params: &DetectParams,
) -> Result<(Vec<u8>, StillResult)> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| AnnotateError::SourceUnreadable(format!("cannot decode image: {e}")))?;

    let result = annotate_image(detector, renderer, &image, params)?;

    let mut encoded = Cursor::new(Vec::new());
    result.image.write_to(&mut encoded, ImageFormat::Png)?;
    Ok((encoded.into_inner(), result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;

    struct OnePerson(HashMap<usize, String>);

    impl Detector for OnePerson {
        fn detect(&self, _: &DynamicImage, _: &DetectParams) -> Result<Vec<Detection>> {
            Ok(vec![Detection::new([2.0, 2.0, 12.0, 12.0], 0.8, 0)])
        }

        fn names(&self) -> &HashMap<usize, String> {
            &self.0
        }
    }

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_annotate_bytes() {
        let detector = OnePerson(HashMap::from([(0, "person".to_string())]));
        let input = png(&RgbImage::from_pixel(20, 16, Rgb([0, 0, 0])));

        let (encoded, result) =
            annotate_bytes(&detector, &Annotator::without_font(), &input, &DetectParams::default()).unwrap();

        assert_eq!(result.summary, "1 person");
        assert_eq!(result.detections.len(), 1);
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 16));
    }

    #[test]
    fn test_undecodable_bytes() {
        let detector = OnePerson(HashMap::new());
        let result = annotate_bytes(
            &detector,
            &Annotator::without_font(),
            b"definitely not an image",
            &DetectParams::default(),
        );
        assert!(matches!(result, Err(AnnotateError::SourceUnreadable(_))));
    }
}
