// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video encoding.
//!
//! A [`FrameSink`] receives frames in order and produces one video file. The
//! container is picked from the target extension by [`open_writer`].

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::RgbImage;

#[cfg(feature = "video")]
use video_rs::{Encoder, Time, encode::Settings as EncoderSettings};

use crate::error::{AnnotateError, Result};

/// Quantizer speed for GIF frames, 1 (best) to 30 (fastest).
const GIF_SPEED: i32 = 10;

#[cfg(feature = "video")]
static INIT: std::sync::Once = std::sync::Once::new();

/// Initialize `video-rs` (FFmpeg). Safe to call multiple times.
#[allow(clippy::missing_const_for_fn)]
pub fn init_video() {
    #[cfg(feature = "video")]
    INIT.call_once(|| {
        if let Err(e) = video_rs::init() {
            tracing::error!(error = %e, "failed to initialize video-rs");
        }
    });
}

/// Ordered consumer of video frames.
pub trait FrameSink {
    /// Append a frame. Frames are shown in the order they are written.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::VideoError`] if encoding fails or the frame
    /// geometry differs from the video's.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the file.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::VideoError`] if the trailer cannot be written.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Open a writer for `path`, choosing the container from its extension.
///
/// # Errors
///
/// Returns [`AnnotateError::FeatureNotEnabled`] for non-GIF targets without
/// the `video` feature, or [`AnnotateError::VideoError`] if the encoder
/// cannot be created.
pub fn open_writer(path: &Path, width: u32, height: u32, fps: f32) -> Result<Box<dyn FrameSink>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if ext == "gif" {
        return Ok(Box::new(GifWriter::new(path, width, height, fps)?));
    }

    #[cfg(feature = "video")]
    {
        Ok(Box::new(VideoWriter::new(path, width, height, fps)?))
    }

    #[cfg(not(feature = "video"))]
    Err(AnnotateError::FeatureNotEnabled(format!(
        "writing {} requires the 'video' feature, use a .gif output instead",
        path.display()
    )))
}

fn check_geometry(frame: &RgbImage, width: u32, height: u32) -> Result<()> {
    if frame.dimensions() == (width, height) {
        Ok(())
    } else {
        Err(AnnotateError::VideoError(format!(
            "Frame dimensions {}x{} do not match video dimensions {width}x{height}",
            frame.width(),
            frame.height()
        )))
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Animated GIF writer, looping forever.
pub struct GifWriter {
    encoder: gif::Encoder<BufWriter<File>>,
    /// Frame delay in centiseconds.
    delay: u16,
    width: u32,
    height: u32,
    path: PathBuf,
}

impl GifWriter {
    /// Create a new `GifWriter`.
    ///
    /// GIF delays have centisecond resolution, so the effective rate is rounded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the geometry does not
    /// fit a GIF logical screen.
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32, fps: f32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (Ok(screen_w), Ok(screen_h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(AnnotateError::VideoError(format!(
                "{width}x{height} exceeds the GIF size limit of {0}x{0}",
                u16::MAX
            )));
        };
        create_parent(&path)?;

        let file = File::create(&path)?;
        let mut encoder = gif::Encoder::new(BufWriter::new(file), screen_w, screen_h, &[])
            .map_err(|e| gif_error(&path, &e))?;
        encoder
            .set_repeat(gif::Repeat::Infinite)
            .map_err(|e| gif_error(&path, &e))?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = (100.0 / f64::from(fps)).round().clamp(1.0, f64::from(u16::MAX)) as u16;

        Ok(Self {
            encoder,
            delay,
            width,
            height,
            path,
        })
    }
}

fn gif_error(path: &Path, e: &gif::EncodingError) -> AnnotateError {
    AnnotateError::VideoError(format!("Failed to write GIF {}: {e}", path.display()))
}

impl FrameSink for GifWriter {
    #[allow(clippy::cast_possible_truncation)]
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        check_geometry(frame, self.width, self.height)?;
        let mut gif_frame =
            gif::Frame::from_rgb_speed(self.width as u16, self.height as u16, frame.as_raw(), GIF_SPEED);
        gif_frame.delay = self.delay;
        self.encoder
            .write_frame(&gif_frame)
            .map_err(|e| gif_error(&self.path, &e))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self { encoder, path, .. } = *self;
        // Trailer first, then the buffered bytes; either can fail on a full disk
        let writer = encoder.into_inner().map_err(|e| gif_error(&path, &e))?;
        writer.into_inner().map_err(|e| {
            AnnotateError::VideoError(format!("Failed to write GIF {}: {}", path.display(), e.error()))
        })?;
        Ok(())
    }
}

/// H.264 writer backed by `video-rs`.
#[cfg(feature = "video")]
pub struct VideoWriter {
    encoder: Encoder,
    frame_duration: Time,
    position: Time,
    width: u32,
    height: u32,
}

#[cfg(feature = "video")]
impl VideoWriter {
    /// Create a new `VideoWriter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder cannot be initialized.
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32, fps: f32) -> Result<Self> {
        init_video();
        let output_path = path.as_ref().to_path_buf();
        create_parent(&output_path)?;

        let settings = EncoderSettings::preset_h264_yuv420p(width as usize, height as usize, false);
        let encoder = Encoder::new(output_path.as_path(), settings).map_err(|e| {
            AnnotateError::VideoError(format!("Failed to create video encoder: {e}"))
        })?;

        Ok(Self {
            encoder,
            frame_duration: Time::from_secs_f64(1.0 / f64::from(fps)),
            position: Time::zero(),
            width,
            height,
        })
    }
}

#[cfg(feature = "video")]
impl FrameSink for VideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        check_geometry(frame, self.width, self.height)?;

        let frame_array = video_rs::Frame::from_shape_vec(
            (self.height as usize, self.width as usize, 3),
            frame.as_raw().clone(),
        )
        .map_err(|e| AnnotateError::VideoError(e.to_string()))?;

        self.encoder
            .encode(&frame_array, self.position)
            .map_err(|e| AnnotateError::VideoError(format!("Failed to encode frame: {e}")))?;

        self.position = self.position.aligned_with(self.frame_duration).add();
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.encoder
            .finish()
            .map_err(|e| AnnotateError::VideoError(format!("Failed to finish video encoding: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FrameReader, GifReader};
    use image::Rgb;

    #[test]
    fn test_gif_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.gif");

        let mut writer = open_writer(&path, 4, 4, 10.0).unwrap();
        for shade in [0u8, 128, 255] {
            writer.write_frame(&RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = GifReader::open(&path).unwrap();
        let mut count = 0;
        while reader.read_frame().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_writer_rejects_wrong_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = GifWriter::new(dir.path().join("out.gif"), 4, 4, 30.0).unwrap();
        let result = writer.write_frame(&RgbImage::new(5, 4));
        assert!(matches!(result, Err(AnnotateError::VideoError(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_gif_finish_reports_full_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        std::os::unix::fs::symlink("/dev/full", &path).unwrap();

        let mut writer = open_writer(&path, 4, 4, 10.0).unwrap();
        writer.write_frame(&RgbImage::new(4, 4)).unwrap();
        assert!(matches!(writer.finish(), Err(AnnotateError::VideoError(_))));
    }

    #[cfg(not(feature = "video"))]
    #[test]
    fn test_mp4_requires_feature() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_writer(&dir.path().join("out.mp4"), 4, 4, 30.0);
        assert!(matches!(result, Err(AnnotateError::FeatureNotEnabled(_))));
    }
}
