// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Input sources.
//!
//! A [`FrameReader`] yields the frames of a video one at a time. Animated GIFs
//! are decoded with `image` and always available; other containers go through
//! `video-rs` (FFmpeg) and need the `video` feature.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, ImageFormat, ImageReader, RgbImage};

use crate::error::{AnnotateError, Result};

/// Video container extensions handled by the FFmpeg reader.
pub const VIDEO_FORMATS: [&str; 10] = [
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpeg", "mpg",
];

/// What a path on disk should be treated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A single still image.
    Image(PathBuf),
    /// A sequence of frames (a video container or an animated GIF).
    Video(PathBuf),
}

impl Source {
    /// Check if source is a still image.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    /// Check if source is a video.
    #[must_use]
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    /// Get the path of this source.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Image(p) | Self::Video(p) => p,
        }
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if ext == "gif" || VIDEO_FORMATS.contains(&ext.as_str()) {
            Self::Video(path.to_path_buf())
        } else {
            Self::Image(path.to_path_buf())
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Self::from(Path::new(s))
    }
}

/// Sequential frame decoder.
pub trait FrameReader {
    /// Decode the next frame.
    ///
    /// `Ok(None)` is end of stream. A frame that exists but cannot be decoded is
    /// an error, never end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::SourceUnreadable`] if the next frame cannot be decoded.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Native frame rate of the source, if the container declares one.
    fn frame_rate(&self) -> Option<f32>;
}

impl<R: FrameReader + ?Sized> FrameReader for Box<R> {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).read_frame()
    }

    fn frame_rate(&self) -> Option<f32> {
        (**self).frame_rate()
    }
}

/// Open a frame reader for a video file.
///
/// GIF files are recognised by content, anything else is handed to FFmpeg.
///
/// # Errors
///
/// Returns [`AnnotateError::SourceUnreadable`] if the file does not exist or
/// cannot be opened as a video.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn FrameReader>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AnnotateError::SourceUnreadable(format!(
            "{} does not exist or is not a file",
            path.display()
        )));
    }

    let format = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| AnnotateError::SourceUnreadable(format!("{}: {e}", path.display())))?
        .format();

    if format == Some(ImageFormat::Gif) {
        return Ok(Box::new(GifReader::open(path)?));
    }

    #[cfg(feature = "video")]
    {
        Ok(Box::new(Mp4Reader::open(path)?))
    }

    #[cfg(not(feature = "video"))]
    Err(AnnotateError::SourceUnreadable(format!(
        "{} is not a GIF; other containers require the 'video' feature",
        path.display()
    )))
}

/// Animated GIF reader.
pub struct GifReader {
    frames: Frames<'static>,
    /// First frame, decoded at open time to learn the frame delay.
    pending: Option<RgbImage>,
    fps: Option<f32>,
    decoded: usize,
}

impl GifReader {
    /// Open a GIF file.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::SourceUnreadable`] if the file is not a readable GIF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |e: &dyn std::fmt::Display| {
            AnnotateError::SourceUnreadable(format!("{}: {e}", path.display()))
        };

        let file = File::open(path).map_err(|e| unreadable(&e))?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| unreadable(&e))?;
        let mut frames = decoder.into_frames();

        let (pending, fps) = match frames.next() {
            Some(Ok(frame)) => {
                let (numer, denom) = frame.delay().numer_denom_ms();
                #[allow(clippy::cast_precision_loss)]
                let delay_ms = numer as f32 / denom.max(1) as f32;
                let fps = (delay_ms > 0.0).then(|| 1000.0 / delay_ms);
                (Some(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8()), fps)
            }
            Some(Err(e)) => return Err(unreadable(&e)),
            None => (None, None),
        };

        Ok(Self {
            frames,
            pending,
            fps,
            decoded: 0,
        })
    }
}

impl FrameReader for GifReader {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(first) = self.pending.take() {
            self.decoded += 1;
            return Ok(Some(first));
        }

        match self.frames.next() {
            Some(Ok(frame)) => {
                self.decoded += 1;
                Ok(Some(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8()))
            }
            Some(Err(e)) => Err(AnnotateError::SourceUnreadable(format!(
                "failed to decode frame {}: {e}",
                self.decoded + 1
            ))),
            None => Ok(None),
        }
    }

    fn frame_rate(&self) -> Option<f32> {
        self.fps
    }
}

/// FFmpeg-backed reader for MP4 and other containers.
#[cfg(feature = "video")]
pub struct Mp4Reader {
    decoder: video_rs::decode::Decoder,
    decoded: usize,
}

#[cfg(feature = "video")]
impl Mp4Reader {
    /// Open a video file.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::SourceUnreadable`] if FFmpeg cannot open the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::io::init_video();
        let path = path.as_ref();
        let decoder = video_rs::decode::Decoder::new(path).map_err(|e| {
            AnnotateError::SourceUnreadable(format!("{}: failed to create decoder: {e}", path.display()))
        })?;
        Ok(Self { decoder, decoded: 0 })
    }
}

#[cfg(feature = "video")]
impl FrameReader for Mp4Reader {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.decoder.decode() {
            Ok((_ts, frame)) => {
                self.decoded += 1;
                video_frame_to_image(&frame).map(Some)
            }
            Err(video_rs::Error::ReadExhausted | video_rs::Error::DecodeExhausted) => Ok(None),
            Err(e) => Err(AnnotateError::SourceUnreadable(format!(
                "failed to decode frame {}: {e}",
                self.decoded + 1
            ))),
        }
    }

    fn frame_rate(&self) -> Option<f32> {
        let fps = self.decoder.frame_rate();
        (fps.is_finite() && fps > 0.0).then_some(fps)
    }
}

/// Convert an HWC `video_rs` frame to an RGB image.
#[cfg(feature = "video")]
fn video_frame_to_image(arr: &video_rs::Frame) -> Result<RgbImage> {
    let shape = arr.shape();
    let invalid = || AnnotateError::SourceUnreadable(format!("unexpected frame shape {shape:?}"));

    if shape.len() != 3 || shape[2] != 3 {
        return Err(invalid());
    }
    let height = u32::try_from(shape[0]).map_err(|_| invalid())?;
    let width = u32::try_from(shape[1]).map_err(|_| invalid())?;

    RgbImage::from_raw(width, height, arr.iter().copied().collect()).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame, Rgba, RgbaImage};
    use std::time::Duration;

    fn write_gif(path: &Path, colors: &[[u8; 3]]) {
        let mut encoder = GifEncoder::new(File::create(path).unwrap());
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for c in colors {
            let buffer = RgbaImage::from_pixel(8, 6, Rgba([c[0], c[1], c[2], 255]));
            let delay = Delay::from_saturating_duration(Duration::from_millis(100));
            encoder.encode_frame(Frame::from_parts(buffer, 0, 0, delay)).unwrap();
        }
    }

    #[test]
    fn test_source_from_path() {
        assert!(Source::from("clip.mp4").is_video());
        assert!(Source::from("clip.GIF").is_video());
        assert!(Source::from("bus.jpg").is_image());
        assert_eq!(Source::from("bus.jpg").path(), Path::new("bus.jpg"));
    }

    #[test]
    fn test_gif_reader_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gif");
        write_gif(&path, &[[255, 0, 0], [0, 255, 0], [0, 0, 255]]);

        let mut reader = open_reader(&path).unwrap();
        let fps = reader.frame_rate().unwrap();
        assert!((fps - 10.0).abs() < 0.5);

        let mut count = 0;
        while let Some(frame) = reader.read_frame().unwrap() {
            assert_eq!(frame.dimensions(), (8, 6));
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_file_unreadable() {
        assert!(matches!(
            open_reader("does/not/exist.mp4"),
            Err(AnnotateError::SourceUnreadable(_))
        ));
    }

    #[test]
    fn test_garbage_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp4");
        std::fs::write(&path, b"this is not a video").unwrap();
        assert!(matches!(
            open_reader(&path),
            Err(AnnotateError::SourceUnreadable(_))
        ));
    }
}
