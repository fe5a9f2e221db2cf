// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::annotate::Annotator;
use crate::cli::args::PredictArgs;
use crate::config::{DEFAULT_RUN_DIR, DetectParams, PipelineConfig, default_output_name};
use crate::detector::Detector;
use crate::model::{YoloDetector, init_detector};
use crate::pipeline::PipelineRun;
use crate::source::Source;
use crate::still::annotate_image;
use crate::utils::format_class_counts;
use crate::{VERSION, error, section, success, verbose};

/// Run the `predict` command on an image or a video.
pub fn run_prediction(args: &PredictArgs) -> ExitCode {
    section!("video-annotate {VERSION} 🚀 Ultralytics YOLO");

    let detector = match init_detector(&args.model) {
        Ok(d) => d,
        Err(e) => {
            error!("Error loading model: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (h, w) = detector.imgsz();
    verbose!(
        "{}: {} classes, imgsz=({h}, {w})",
        detector.model_path(),
        detector.num_classes()
    );

    let mut params = DetectParams::new()
        .with_confidence(args.conf)
        .with_iou(args.iou)
        .with_max_detections(args.max_det);
    if let Some(sz) = args.imgsz {
        params = params.with_imgsz(sz, sz);
    }

    let outcome = match Source::from(args.source.as_path()) {
        Source::Image(path) => predict_image(detector, &path, args, params),
        Source::Video(path) => predict_video(detector, &path, args, params),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn predict_image(
    detector: &YoloDetector,
    path: &Path,
    args: &PredictArgs,
    params: DetectParams,
) -> Result<(), String> {
    params.validate().map_err(|e| e.to_string())?;

    let image = image::open(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    let result = annotate_image(detector, &Annotator::new(), &image, &params).map_err(|e| e.to_string())?;

    let output = args.output.clone().unwrap_or_else(|| {
        Path::new(DEFAULT_RUN_DIR).join(path.file_name().unwrap_or_else(|| "annotated.png".as_ref()))
    });
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    result
        .image
        .save(&output)
        .map_err(|e| format!("Cannot write {}: {e}", output.display()))?;

    let summary = if result.summary.is_empty() {
        "(no detections)".to_string()
    } else {
        result.summary
    };
    verbose!("image {}: {}x{} {summary}", path.display(), image.width(), image.height());
    success!("Result saved to {}", output.display());
    Ok(())
}

fn predict_video(
    detector: &YoloDetector,
    path: &Path,
    args: &PredictArgs,
    params: DetectParams,
) -> Result<(), String> {
    let run_dir = PathBuf::from(DEFAULT_RUN_DIR);
    let config = PipelineConfig::new()
        .with_work_dir(args.work_dir.clone().unwrap_or_else(|| run_dir.join("work")))
        .with_output(args.output.clone().unwrap_or_else(|| run_dir.join(default_output_name())))
        .with_fps(args.fps)
        .with_frame_format(args.frame_format)
        .with_workers(args.workers)
        .with_params(params);

    verbose!("video {}: writing {} at {} fps", path.display(), config.output_path.display(), config.fps);

    let mut run = PipelineRun::new(detector, config);
    let video = run.run(path).map_err(|failure| failure.to_string())?;

    let summary = format_class_counts(&video.class_counts, detector.names());
    success!(
        "{} frames ({}x{}, {:.1}s at {} fps), {}, saved to {}",
        video.frame_count,
        video.width,
        video.height,
        video.duration_secs(),
        video.fps,
        if summary.is_empty() { "no detections" } else { summary.as_str() },
        video.path.display()
    );
    Ok(())
}
