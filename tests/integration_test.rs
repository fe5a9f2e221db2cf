// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the annotation library

use std::collections::HashMap;

use image::codecs::gif::GifEncoder;
use image::{Delay, DynamicImage, Frame, Rgb, RgbImage, Rgba, RgbaImage};
use video_annotate::{
    Annotated, AnnotateError, Annotator, DetectParams, Detection, Detector, MediaType,
    PipelineConfig, Source, UploadError, handle_upload,
};

struct CenterDetector(HashMap<usize, String>);

impl Detector for CenterDetector {
    fn detect(&self, image: &DynamicImage, _: &DetectParams) -> video_annotate::Result<Vec<Detection>> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![
            Detection::new([w * 0.25, h * 0.25, w * 0.75, h * 0.75], 0.9, 0),
            Detection::new([1.0, 1.0, 4.0, 4.0], 0.6, 0),
        ])
    }

    fn names(&self) -> &HashMap<usize, String> {
        &self.0
    }
}

fn detector() -> CenterDetector {
    CenterDetector(HashMap::from([(0, "person".to_string())]))
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn gif_bytes(frames: usize, width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        for i in 0..frames {
            let shade = u8::try_from(40 * i).unwrap();
            let buffer = RgbaImage::from_pixel(width, height, Rgba([shade, 80, 160, 255]));
            let delay = Delay::from_numer_denom_ms(100, 1);
            encoder.encode_frame(Frame::from_parts(buffer, 0, 0, delay)).unwrap();
        }
    }
    bytes
}

#[test]
fn test_detect_params_defaults() {
    let params = DetectParams::default();
    assert_eq!(params.confidence, 0.25);
    assert_eq!(params.iou, 0.45);
    assert_eq!(params.max_detections, 300);
    assert!(params.imgsz.is_none());
}

#[test]
fn test_pipeline_config_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.fps, 30.0);
    assert_eq!(config.workers, 0);
    assert!(config.validate().is_ok());
    assert!(config.with_fps(f32::NAN).validate().is_err());
}

#[test]
fn test_detection_creation() {
    let detection = Detection::new([10.0, 20.0, 30.0, 40.0], 0.95, 0);
    assert_eq!(detection.confidence, 0.95);
    assert_eq!(detection.class_id, 0);
    assert_eq!(detection.bbox, [10.0, 20.0, 30.0, 40.0]);
}

#[test]
fn test_source_dispatch() {
    assert!(Source::from("bus.jpg").is_image());
    assert!(Source::from("clip.MP4").is_video());
    assert!(Source::from("loop.gif").is_video());
    assert_eq!(MediaType::parse("image/gif").unwrap(), MediaType::Image);
}

#[test]
fn test_image_upload_is_annotated() {
    let tmp = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new()
        .with_work_dir(tmp.path().join("work"))
        .with_output(tmp.path().join("output.gif"));
    let input = RgbImage::from_pixel(40, 30, Rgb([90, 90, 90]));

    let annotated = handle_upload(
        &detector(),
        Annotator::without_font(),
        &config,
        &png_bytes(&input),
        "image/png",
    )
    .unwrap();

    assert_eq!(annotated.media_type(), "image/png");
    assert_eq!(annotated.filename(), "annotated.png");
    let Annotated::Image { summary, bytes, .. } = &annotated else {
        panic!("expected an image result");
    };
    assert_eq!(summary, "2 persons");

    let decoded = image::load_from_memory(bytes).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (40, 30));
    assert_ne!(decoded, input);
    // Still images never touch the pipeline directories
    assert!(!tmp.path().join("work").exists());
}

#[test]
fn test_upload_rejections() {
    let config = PipelineConfig::default();

    let err = handle_upload(&detector(), Annotator::without_font(), &config, b"hello", "text/plain")
        .unwrap_err();
    assert!(matches!(err.error(), AnnotateError::UnsupportedMedia(_)));
    assert!(err.stage().is_none());

    let err = handle_upload(&detector(), Annotator::without_font(), &config, b"not a png", "image/png")
        .unwrap_err();
    assert!(matches!(err, UploadError::Rejected(AnnotateError::SourceUnreadable(_))));
    assert!(err.error().is_input_error());
}

#[test]
fn test_video_upload_runs_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new()
        .with_work_dir(tmp.path().join("work"))
        .with_output(tmp.path().join("output.gif"))
        .with_fps(10.0);

    // Content sniffing finds the GIF even though the client claims MP4
    let annotated = handle_upload(
        &detector(),
        Annotator::without_font(),
        &config,
        &gif_bytes(4, 32, 24),
        "video/mp4",
    )
    .unwrap();

    assert_eq!(annotated.media_type(), "image/gif");
    assert_eq!(annotated.filename(), "annotated.gif");
    let Annotated::Video { frames, summary, bytes, .. } = &annotated else {
        panic!("expected a video result");
    };
    assert_eq!(*frames, 4);
    assert_eq!(summary, "8 persons");
    assert_eq!(&bytes[..3], b"GIF");
    assert!(!tmp.path().join("work").exists());
}
