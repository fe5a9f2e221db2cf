// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_FPS;
use crate::download::DEFAULT_MODEL;
use crate::frame::FrameFormat;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    video-annotate predict --source video.mp4
    video-annotate predict --model yolo11n.onnx --source bus.jpg --conf 0.5
    video-annotate predict -s clip.gif --fps 15 --output runs/annotate/clip.gif
    video-annotate predict -s video.mp4 --imgsz 1280 --workers 4 --verbose"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Annotate an image or a video with detections
    Predict(PredictArgs),
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Path to ONNX model file
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Image or video to annotate
    #[arg(short, long)]
    pub source: PathBuf,

    /// Confidence threshold
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// `IoU` threshold for NMS
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Inference image size
    #[arg(long)]
    pub imgsz: Option<usize>,

    /// Maximum number of detections per frame
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// Output video frame rate
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: f32,

    /// Output file (defaults to runs/annotate/<name>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Scratch directory for extracted and annotated frames
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Annotation worker threads (0 uses all cores)
    #[arg(long, default_value_t = 0)]
    pub workers: usize,

    /// Format of intermediate frames (png, jpeg)
    #[arg(long, default_value = "png")]
    pub frame_format: FrameFormat,

    /// Show verbose output
    #[arg(long, num_args = 0..=1, default_value_t = false, default_missing_value = "true", action = clap::ArgAction::Set)]
    pub verbose: bool,
}
