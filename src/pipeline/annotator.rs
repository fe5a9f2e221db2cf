// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame annotation stage.

use std::fs;
use std::path::PathBuf;

use rayon::prelude::*;

use crate::annotate::Annotator;
use crate::config::DetectParams;
use crate::detector::Detector;
use crate::error::{AnnotateError, Result};
use crate::frame::{AnnotatedFrame, Frame, FrameFormat, FrameName};

/// Runs the detector over a frame manifest and writes annotated artifacts.
///
/// Frames are processed in parallel on a rayon pool; results come back in
/// manifest order and keep their source index.
pub struct FrameAnnotator<'a, D: ?Sized> {
    detector: &'a D,
    renderer: &'a Annotator,
    params: DetectParams,
    out_dir: PathBuf,
    format: FrameFormat,
    workers: usize,
}

impl<'a, D: Detector + ?Sized> FrameAnnotator<'a, D> {
    /// Create an annotator writing into `out_dir`, which must already exist.
    pub fn new<P: Into<PathBuf>>(
        detector: &'a D,
        renderer: &'a Annotator,
        params: DetectParams,
        out_dir: P,
    ) -> Self {
        Self {
            detector,
            renderer,
            params,
            out_dir: out_dir.into(),
            format: FrameFormat::default(),
            workers: 0,
        }
    }

    /// Set the artifact format.
    #[must_use]
    pub const fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    /// Limit the number of worker threads. `0` uses the global rayon pool.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Annotate every frame of the manifest.
    ///
    /// # Errors
    ///
    /// Fails on the first frame that cannot be loaded, detected or written.
    /// Detector errors keep their kind ([`AnnotateError::DetectorUnavailable`]
    /// or [`AnnotateError::Inference`]).
    pub fn annotate(&self, frames: &[Frame]) -> Result<Vec<AnnotatedFrame>> {
        let run = || {
            frames
                .par_iter()
                .map(|frame| self.annotate_frame(frame))
                .collect::<Result<Vec<_>>>()
        };

        if self.workers == 0 {
            return run();
        }

        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| AnnotateError::ConfigError(format!("Failed to build worker pool: {e}")))?
            .install(run)
    }

    fn annotate_frame(&self, frame: &Frame) -> Result<AnnotatedFrame> {
        let image = image::open(&frame.path)?;
        let detections = self.detector.detect(&image, &self.params)?;
        let path = FrameName::new(frame.index, self.format).path_in(&self.out_dir);

        if detections.is_empty() && frame.path.extension() == path.extension() {
            fs::copy(&frame.path, &path)?;
        } else {
            self.renderer
                .render(&image, &detections, self.detector.names())
                .save_with_format(&path, self.format.image_format())?;
        }

        tracing::debug!(index = frame.index, detections = detections.len(), "frame annotated");
        Ok(AnnotatedFrame {
            index: frame.index,
            path,
            width: image.width(),
            height: image.height(),
            class_ids: detections.iter().map(|d| d.class_id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detection;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::collections::HashMap;
    use std::path::Path;

    /// Reports one box on frames whose top-left pixel is bright.
    struct BrightDetector(HashMap<usize, String>);

    impl Detector for BrightDetector {
        fn detect(&self, image: &DynamicImage, _: &DetectParams) -> Result<Vec<Detection>> {
            if image.to_rgb8().get_pixel(0, 0)[0] > 128 {
                Ok(vec![Detection::new([1.0, 1.0, 10.0, 10.0], 0.9, 0)])
            } else {
                Ok(Vec::new())
            }
        }

        fn names(&self) -> &HashMap<usize, String> {
            &self.0
        }
    }

    struct FailingDetector(HashMap<usize, String>);

    impl Detector for FailingDetector {
        fn detect(&self, _: &DynamicImage, _: &DetectParams) -> Result<Vec<Detection>> {
            Err(AnnotateError::Inference("bad tensor".to_string()))
        }

        fn names(&self) -> &HashMap<usize, String> {
            &self.0
        }
    }

    fn write_frames(dir: &Path, shades: &[u8]) -> Vec<Frame> {
        shades
            .iter()
            .enumerate()
            .map(|(i, &shade)| {
                let path = FrameName::new(i + 1, FrameFormat::Png).path_in(dir);
                RgbImage::from_pixel(16, 12, Rgb([shade, shade, shade])).save(&path).unwrap();
                Frame {
                    index: i + 1,
                    path,
                    width: 16,
                    height: 12,
                }
            })
            .collect()
    }

    #[test]
    fn test_annotate_keeps_order_and_index() {
        let tmp = tempfile::tempdir().unwrap();
        let (src, out) = (tmp.path().join("frames"), tmp.path().join("annotated"));
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&out).unwrap();

        let frames = write_frames(&src, &[0, 255, 0, 255, 0, 255]);
        let detector = BrightDetector(HashMap::new());
        let renderer = Annotator::without_font();

        let annotated = FrameAnnotator::new(&detector, &renderer, DetectParams::default(), &out)
            .with_workers(2)
            .annotate(&frames)
            .unwrap();

        assert_eq!(annotated.len(), 6);
        for (frame, result) in frames.iter().zip(&annotated) {
            assert_eq!(frame.index, result.index);
            assert_eq!(result.path, out.join(format!("frame_{:04}.png", frame.index)));
            assert_eq!(result.detections(), usize::from(frame.index % 2 == 0));
        }
    }

    #[test]
    fn test_zero_detections_pass_through() {
        let tmp = tempfile::tempdir().unwrap();
        let frames = write_frames(tmp.path(), &[10]);
        let out = tmp.path().join("annotated");
        fs::create_dir_all(&out).unwrap();

        let detector = BrightDetector(HashMap::new());
        let renderer = Annotator::without_font();
        let annotated = FrameAnnotator::new(&detector, &renderer, DetectParams::default(), &out)
            .annotate(&frames)
            .unwrap();

        let before = image::open(&frames[0].path).unwrap();
        let after = image::open(&annotated[0].path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_detector_error_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let frames = write_frames(tmp.path(), &[0, 0]);
        let out = tmp.path().join("annotated");
        fs::create_dir_all(&out).unwrap();

        let detector = FailingDetector(HashMap::new());
        let renderer = Annotator::without_font();
        let result = FrameAnnotator::new(&detector, &renderer, DetectParams::default(), &out).annotate(&frames);
        assert!(matches!(result, Err(AnnotateError::Inference(_))));
    }
}
