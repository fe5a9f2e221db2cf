// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Video Annotate
//!
//! Annotate images and videos with [Ultralytics](https://ultralytics.com) YOLO
//! object detections. Videos are split into frames, every frame is run through
//! the detector and drawn on, and the annotated frames are re-encoded at a fixed
//! frame rate.
//!
//! ## Features
//!
//! - **ONNX Runtime** - Runs Ultralytics YOLO detection exports through `ort`
//! - **Frame pipeline** - Extract, annotate and assemble stages with explicit frame manifests
//! - **Parallel annotation** - Frames are annotated on a `rayon` pool, output order is preserved
//! - **Clean failures** - Every run ends `Done` or `Failed { stage }` and removes its scratch directory
//! - **GIF and MP4** - Animated GIF works out of the box, H.264 MP4 with the `video` feature
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use video_annotate::{PipelineConfig, PipelineRun, init_detector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load once per process - class names and input size come from the model
//!     let detector = init_detector("yolo11n.onnx")?;
//!
//!     let config = PipelineConfig::new()
//!         .with_output("runs/annotate/output.gif")
//!         .with_fps(30.0);
//!
//!     let mut run = PipelineRun::new(detector, config);
//!     match run.run("video.gif") {
//!         Ok(video) => println!("{} frames written to {}", video.frame_count, video.path.display()),
//!         Err(failure) => eprintln!("{failure}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Annotate a video
//! video-annotate predict --source video.mp4
//!
//! # Annotate an image with custom thresholds
//! video-annotate predict -m yolo11n.onnx -s bus.jpg --conf 0.5 --iou 0.45
//!
//! # Encode at 15 fps into a GIF
//! video-annotate predict -s clip.gif --fps 15 --output runs/annotate/clip.gif
//! ```
//!
//! **CLI Options:**
//!
//! | Option | Short | Description | Default |
//! |--------|-------|-------------|---------|
//! | `--model` | `-m` | Path to ONNX model | `yolo11n.onnx` |
//! | `--source` | `-s` | Image or video to annotate | required |
//! | `--conf` | | Confidence threshold | `0.25` |
//! | `--iou` | | `IoU` threshold for NMS | `0.45` |
//! | `--imgsz` | | Inference image size | model size |
//! | `--fps` | | Output video frame rate | `30` |
//! | `--output` | `-o` | Output file | `runs/annotate/...` |
//! | `--work-dir` | | Scratch directory for frames | `runs/annotate/work` |
//! | `--workers` | | Annotation threads | all cores |
//!
//! ## Custom Detectors
//!
//! The pipeline only needs the [`Detector`] trait, so any detector can be
//! plugged in:
//!
//! ```rust
//! use std::collections::HashMap;
//! use image::DynamicImage;
//! use video_annotate::{DetectParams, Detection, Detector, Result};
//!
//! struct Nothing(HashMap<usize, String>);
//!
//! impl Detector for Nothing {
//!     fn detect(&self, _: &DynamicImage, _: &DetectParams) -> Result<Vec<Detection>> {
//!         Ok(Vec::new())
//!     }
//!
//!     fn names(&self) -> &HashMap<usize, String> {
//!         &self.0
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | [`PipelineRun`] and the extract, annotate and assemble stages |
//! | [`detector`] | [`Detector`] trait and [`Detection`] |
//! | [`model`] | [`YoloDetector`] (ONNX Runtime) and the process-wide instance |
//! | [`config`] | [`DetectParams`] and [`PipelineConfig`] |
//! | [`frame`] | Frame artifacts and [`OutputVideo`] |
//! | [`source`] | [`FrameReader`] implementations |
//! | [`io`] | [`FrameSink`] implementations |
//! | [`upload`] | Media type dispatch for uploaded bytes |
//! | [`still`] | Single-image annotation |
//! | [`error`] | Error types ([`AnnotateError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `video` | MP4 and other containers through FFmpeg (`video-rs`) |
//!
//! ## License
//!
//! AGPL-3.0, see [ultralytics.com/license](https://ultralytics.com/license).

// Modules
pub mod annotate;
pub mod cli;
pub mod config;
pub mod detector;
pub mod download;
pub mod error;
pub mod frame;
pub mod io;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod postprocessing;
pub mod preprocessing;
pub mod source;
pub mod still;
pub mod upload;
pub mod utils;

// Re-export main types for convenience
pub use annotate::Annotator;
pub use config::{DetectParams, PipelineConfig};
pub use detector::{Detection, Detector};
pub use error::{AnnotateError, Result};
pub use frame::{AnnotatedFrame, Frame, FrameFormat, OutputVideo};
pub use io::FrameSink;
pub use model::{YoloDetector, detector, init_detector};
pub use pipeline::{PipelineRun, RunFailure, RunState, Stage};
pub use source::{FrameReader, Source, open_reader};
pub use still::StillResult;
pub use upload::{Annotated, MediaType, UploadError, handle_upload};

// Re-export metadata for advanced use
pub use metadata::ModelMetadata;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
