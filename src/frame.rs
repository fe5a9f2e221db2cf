// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame artifacts exchanged between pipeline stages.
//!
//! Stages never hand frames over in memory. Each stage writes indexed image
//! artifacts (`frame_0001.png`, `frame_0002.png`, ...) and passes the next stage
//! an ordered manifest of [`Frame`] or [`AnnotatedFrame`] records pointing at them.

use std::fmt;
use std::path::{Path, PathBuf};

use image::ImageFormat;

/// Prefix of every frame artifact name.
pub const FRAME_PREFIX: &str = "frame_";

/// Minimum number of digits in a frame artifact index.
pub const INDEX_WIDTH: usize = 4;

/// Image format used for intermediate frame artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// Lossless PNG. Frames without detections round-trip unchanged.
    #[default]
    Png,
    /// JPEG, smaller and faster to write but lossy.
    Jpeg,
}

impl FrameFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    /// Matching `image` crate format.
    #[must_use]
    pub const fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl std::str::FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(format!("unsupported frame format '{other}' (expected png or jpg)")),
        }
    }
}

/// Indexed artifact name, `frame_%04d.<ext>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameName {
    /// 1-based sequence index.
    pub index: usize,
    /// Artifact format.
    pub format: FrameFormat,
}

impl FrameName {
    /// Create a name for the given index.
    #[must_use]
    pub const fn new(index: usize, format: FrameFormat) -> Self {
        Self { index, format }
    }

    /// Recover the name from a file name such as `frame_0042.png`.
    ///
    /// Indices wider than four digits are accepted. The extension must be the
    /// one [`FrameFormat::extension`] writes. Returns `None` for anything that is
    /// not a frame artifact.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        let digits = stem.strip_prefix(FRAME_PREFIX)?;
        if digits.len() < INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse().ok()?;
        let format = [FrameFormat::Png, FrameFormat::Jpeg]
            .into_iter()
            .find(|f| f.extension() == ext)?;
        Some(Self { index, format })
    }

    /// Path of this artifact inside `dir`.
    #[must_use]
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }
}

impl fmt::Display for FrameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{FRAME_PREFIX}{:0width$}.{}",
            self.index,
            self.format.extension(),
            width = INDEX_WIDTH
        )
    }
}

/// A decoded frame persisted as an indexed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 1-based sequence index.
    pub index: usize,
    /// Artifact path.
    pub path: PathBuf,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Frame {
    /// Frame geometry as (width, height).
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A frame after detection overlays were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedFrame {
    /// Sequence index of the source frame.
    pub index: usize,
    /// Artifact path.
    pub path: PathBuf,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Class ID of every detection drawn on the frame.
    pub class_ids: Vec<usize>,
}

impl AnnotatedFrame {
    /// Frame geometry as (width, height).
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of detections drawn on the frame.
    #[must_use]
    pub fn detections(&self) -> usize {
        self.class_ids.len()
    }
}

/// Collect every frame artifact in `dir`, ordered by parsed index.
///
/// Used for inspection and tests only. The pipeline itself passes manifests
/// between stages and never lists directories.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_frame_artifacts(dir: &Path) -> std::io::Result<Vec<(FrameName, PathBuf)>> {
    let mut artifacts: Vec<(FrameName, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let name = FrameName::parse(&entry.file_name().to_string_lossy())?;
            Some((name, entry.path()))
        })
        .collect();
    artifacts.sort_by_key(|(name, _)| name.index);
    Ok(artifacts)
}

/// An encoded output video.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputVideo {
    /// Path of the encoded file.
    pub path: PathBuf,
    /// Number of frames written.
    pub frame_count: usize,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Declared frame rate.
    pub fps: f32,
    /// Detections over all frames as (class ID, count), by ascending class ID.
    pub class_counts: Vec<(usize, usize)>,
}

impl OutputVideo {
    /// Playback duration in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        self.frame_count as f32 / self.fps
    }
}
