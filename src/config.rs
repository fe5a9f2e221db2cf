// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection parameters and pipeline configuration.
//!
//! [`DetectParams`] controls a single detector call (input size, thresholds).
//! [`PipelineConfig`] controls a video run: where scratch frames live, where the
//! output video goes, at which frame rate it is encoded, and how many workers
//! annotate frames. Both use a builder pattern.

use std::path::{Path, PathBuf};

use crate::error::{AnnotateError, Result};
use crate::frame::FrameFormat;

/// Default output frame rate for assembled videos.
pub const DEFAULT_FPS: f32 = 30.0;

/// Default parent directory for results.
pub const DEFAULT_RUN_DIR: &str = "runs/annotate";

/// Parameters passed to every detector call.
///
/// # Example
///
/// ```rust
/// use video_annotate::DetectParams;
///
/// let params = DetectParams::new()
///     .with_confidence(0.5)
///     .with_iou(0.45)
///     .with_imgsz(640, 640);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    /// Inference input size (height, width). `None` uses the size the model was exported with.
    pub imgsz: Option<(usize, usize)>,
    /// Detections scoring below this threshold are discarded.
    pub confidence: f32,
    /// `IoU` threshold for per-class Non-Maximum Suppression.
    pub iou: f32,
    /// Maximum number of detections kept per image.
    pub max_detections: usize,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            imgsz: None,
            confidence: 0.25,
            iou: 0.45,
            max_detections: 300,
        }
    }
}

impl DetectParams {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence = threshold;
        self
    }

    /// Set the `IoU` threshold for NMS.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou = threshold;
        self
    }

    /// Set the maximum number of detections per image.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Set the inference input size as (height, width).
    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }

    /// Check that thresholds are within [0, 1] and the input size is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::ConfigError`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AnnotateError::ConfigError(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(AnnotateError::ConfigError(format!(
                "iou must be within [0, 1], got {}",
                self.iou
            )));
        }
        if let Some((h, w)) = self.imgsz
            && (h == 0 || w == 0)
        {
            return Err(AnnotateError::ConfigError(format!(
                "imgsz must be non-zero, got {h}x{w}"
            )));
        }
        Ok(())
    }
}

/// Configuration for a video annotation run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Scratch directory owned by the run. Deleted when the run ends.
    pub work_dir: PathBuf,
    /// Output video path. The container is chosen from its extension.
    pub output_path: PathBuf,
    /// Output frame rate.
    pub fps: f32,
    /// Image format of intermediate frame artifacts.
    pub frame_format: FrameFormat,
    /// Annotation worker threads. `0` lets rayon decide.
    pub workers: usize,
    /// Parameters for every detector call.
    pub params: DetectParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let run_dir = Path::new(DEFAULT_RUN_DIR);
        Self {
            work_dir: run_dir.join("work"),
            output_path: run_dir.join(default_output_name()),
            fps: DEFAULT_FPS,
            frame_format: FrameFormat::Png,
            workers: 0,
            params: DetectParams::default(),
        }
    }
}

/// Output file name used when none is configured.
///
/// H.264 MP4 when FFmpeg support is compiled in, animated GIF otherwise.
#[must_use]
pub const fn default_output_name() -> &'static str {
    if cfg!(feature = "video") {
        "output.mp4"
    } else {
        "output.gif"
    }
}

impl PipelineConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_work_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set the output video path.
    #[must_use]
    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = path.into();
        self
    }

    /// Set the output frame rate.
    #[must_use]
    pub const fn with_fps(mut self, fps: f32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the intermediate frame format.
    #[must_use]
    pub const fn with_frame_format(mut self, format: FrameFormat) -> Self {
        self.frame_format = format;
        self
    }

    /// Set the number of annotation workers.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the detection parameters.
    #[must_use]
    pub const fn with_params(mut self, params: DetectParams) -> Self {
        self.params = params;
        self
    }

    /// Validate the configuration before a run starts.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::ConfigError`] if the frame rate is not a positive
    /// finite number, the working directory and output overlap, or the detection
    /// parameters are invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(AnnotateError::ConfigError(format!(
                "fps must be a positive number, got {}",
                self.fps
            )));
        }
        // The working directory is wiped at the start and end of every run
        if self.output_path.starts_with(&self.work_dir) {
            return Err(AnnotateError::ConfigError(format!(
                "output {} must not be inside the working directory {}",
                self.output_path.display(),
                self.work_dir.display()
            )));
        }
        self.params.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_default() {
        let params = DetectParams::default();
        assert!((params.confidence - 0.25).abs() < f32::EPSILON);
        assert!((params.iou - 0.45).abs() < f32::EPSILON);
        assert_eq!(params.max_detections, 300);
        assert!(params.imgsz.is_none());
    }

    #[test]
    fn test_params_builder() {
        let params = DetectParams::new()
            .with_confidence(0.5)
            .with_iou(0.6)
            .with_max_detections(100)
            .with_imgsz(320, 320);

        assert!((params.confidence - 0.5).abs() < f32::EPSILON);
        assert!((params.iou - 0.6).abs() < f32::EPSILON);
        assert_eq!(params.max_detections, 100);
        assert_eq!(params.imgsz, Some((320, 320)));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_rejects_out_of_range() {
        assert!(DetectParams::new().with_confidence(1.5).validate().is_err());
        assert!(DetectParams::new().with_iou(-0.1).validate().is_err());
        assert!(DetectParams::new().with_imgsz(0, 640).validate().is_err());
    }

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert!((config.fps - DEFAULT_FPS).abs() < f32::EPSILON);
        assert_eq!(config.frame_format, FrameFormat::Png);
        assert_eq!(config.work_dir, Path::new("runs/annotate/work"));
        assert!(config.output_path.starts_with(DEFAULT_RUN_DIR));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_rejects_bad_fps() {
        assert!(PipelineConfig::new().with_fps(0.0).validate().is_err());
        assert!(PipelineConfig::new().with_fps(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_pipeline_rejects_output_inside_work_dir() {
        let config = PipelineConfig::new()
            .with_work_dir("scratch")
            .with_output("scratch/out.gif");
        assert!(matches!(
            config.validate(),
            Err(AnnotateError::ConfigError(_))
        ));
    }
}
