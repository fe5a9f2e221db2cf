// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detector abstraction.
//!
//! The pipeline only depends on the [`Detector`] trait. [`crate::YoloDetector`]
//! is the ONNX Runtime implementation used in production.

use std::collections::HashMap;

use image::DynamicImage;

use crate::config::DetectParams;
use crate::error::Result;

/// A single detected object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Bounding box `[x1, y1, x2, y2]` in source image pixels.
    pub bbox: [f32; 4],
    /// Confidence score (0.0 to 1.0).
    pub confidence: f32,
    /// Class ID.
    pub class_id: usize,
}

impl Detection {
    /// Create a new detection.
    #[must_use]
    pub const fn new(bbox: [f32; 4], confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }
}

/// An object detector that can be shared across annotation workers.
///
/// Implementations must be stateless from the caller's point of view: the same
/// image and parameters give the same detections, and calls from several threads
/// may overlap.
pub trait Detector: Send + Sync {
    /// Detect objects in an image.
    ///
    /// An empty vector means the detector ran and found nothing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AnnotateError::DetectorUnavailable`] if the detector cannot
    /// be invoked at all, or [`crate::AnnotateError::Inference`] if it failed on
    /// this particular image.
    fn detect(&self, image: &DynamicImage, params: &DetectParams) -> Result<Vec<Detection>>;

    /// Class ID to class name mapping.
    fn names(&self) -> &HashMap<usize, String>;
}

impl<D: Detector + ?Sized> Detector for &D {
    fn detect(&self, image: &DynamicImage, params: &DetectParams) -> Result<Vec<Detection>> {
        (**self).detect(image, params)
    }

    fn names(&self) -> &HashMap<usize, String> {
        (**self).names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(HashMap<usize, String>);

    impl Detector for Fixed {
        fn detect(&self, _: &DynamicImage, _: &DetectParams) -> Result<Vec<Detection>> {
            Ok(vec![Detection::new([1.0, 2.0, 3.0, 4.0], 0.5, 0)])
        }

        fn names(&self) -> &HashMap<usize, String> {
            &self.0
        }
    }

    #[test]
    fn test_detector_by_reference() {
        let inner = Fixed(HashMap::from([(0, "car".to_string())]));
        let by_ref: &dyn Detector = &&inner;
        let image = DynamicImage::new_rgb8(4, 4);
        let detections = by_ref.detect(&image, &DetectParams::default()).unwrap();
        assert_eq!(detections[0].bbox, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(by_ref.names()[&0], "car");
    }
}
