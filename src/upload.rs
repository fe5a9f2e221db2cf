// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Upload boundary.
//!
//! An upload is a byte stream plus a declared media type. Images take the
//! still path, videos go through a [`PipelineRun`]. The result carries the
//! bytes to display or download.

use std::fs;
use std::io::Write;

use thiserror::Error;

use crate::annotate::Annotator;
use crate::config::PipelineConfig;
use crate::detector::Detector;
use crate::error::AnnotateError;
use crate::pipeline::{PipelineRun, RunFailure, Stage};
use crate::still::annotate_bytes;
use crate::utils::format_class_counts;

/// Video media types and the file suffix their upload is spooled under.
const VIDEO_TYPES: [(&str, &str); 5] = [
    ("video/mp4", ".mp4"),
    ("video/quicktime", ".mov"),
    ("video/x-matroska", ".mkv"),
    ("video/webm", ".webm"),
    ("video/x-msvideo", ".avi"),
];

/// Where an upload is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Any `image/*` type, animated GIF included.
    Image,
    /// A supported video container.
    Video {
        /// Suffix for the spooled upload, e.g. `.mp4`.
        suffix: &'static str,
    },
}

impl MediaType {
    /// Classify a declared media type. Parameters such as `; codecs=...` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::UnsupportedMedia`] for anything that is neither
    /// an image nor a supported video container.
    pub fn parse(mime: &str) -> Result<Self, AnnotateError> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

        if essence.starts_with("image/") {
            return Ok(Self::Image);
        }

        VIDEO_TYPES
            .iter()
            .find(|(video, _)| *video == essence)
            .map(|&(_, suffix)| Self::Video { suffix })
            .ok_or_else(|| AnnotateError::UnsupportedMedia(mime.to_string()))
    }
}

/// Media type of an output file with the given lowercase extension.
fn media_type_for(extension: &str) -> &'static str {
    if extension == "gif" {
        return "image/gif";
    }
    VIDEO_TYPES
        .iter()
        .find(|(_, suffix)| suffix.strip_prefix('.') == Some(extension))
        .map_or("application/octet-stream", |&(media_type, _)| media_type)
}

/// Annotated output ready for display or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotated {
    /// PNG-encoded annotated image.
    Image {
        /// Encoded bytes.
        bytes: Vec<u8>,
        /// Media type of `bytes`.
        media_type: &'static str,
        /// Suggested download file name.
        filename: String,
        /// Detection counts, e.g. "2 persons, 1 bus".
        summary: String,
    },
    /// Encoded annotated video.
    Video {
        /// Encoded bytes.
        bytes: Vec<u8>,
        /// Media type of `bytes`.
        media_type: &'static str,
        /// Suggested download file name.
        filename: String,
        /// Number of frames in the video.
        frames: usize,
        /// Detection counts over all frames.
        summary: String,
    },
}

impl Annotated {
    /// Encoded output bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Image { bytes, .. } | Self::Video { bytes, .. } => bytes,
        }
    }

    /// Media type of the output bytes.
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Image { media_type, .. } | Self::Video { media_type, .. } => *media_type,
        }
    }

    /// Suggested download file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::Image { filename, .. } | Self::Video { filename, .. } => filename,
        }
    }
}

/// Why an upload produced no output.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Rejected or failed outside the video pipeline.
    #[error(transparent)]
    Rejected(#[from] AnnotateError),
    /// The video pipeline failed.
    #[error(transparent)]
    Run(#[from] RunFailure),
}

impl UploadError {
    /// Pipeline stage that failed, for video uploads.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Rejected(_) => None,
            Self::Run(failure) => Some(failure.stage),
        }
    }

    /// Underlying error.
    #[must_use]
    pub const fn error(&self) -> &AnnotateError {
        match self {
            Self::Rejected(error) | Self::Run(RunFailure { error, .. }) => error,
        }
    }
}

/// Annotate an uploaded image or video.
///
/// Videos are spooled to a temporary file and run through the pipeline with
/// `config`; the output video is then read back.
///
/// # Errors
///
/// [`UploadError::Rejected`] for unsupported media types and still-image
/// failures, [`UploadError::Run`] for pipeline failures.
pub fn handle_upload<D: Detector + ?Sized>(
    detector: &D,
    renderer: Annotator,
    config: &PipelineConfig,
    bytes: &[u8],
    mime: &str,
) -> Result<Annotated, UploadError> {
    match MediaType::parse(mime)? {
        MediaType::Image => {
            tracing::info!(mime, size = bytes.len(), "annotating image upload");
            let (encoded, result) = annotate_bytes(detector, &renderer, bytes, &config.params)?;
            Ok(Annotated::Image {
                bytes: encoded,
                media_type: "image/png",
                filename: "annotated.png".to_string(),
                summary: result.summary,
            })
        }
        MediaType::Video { suffix } => {
            tracing::info!(mime, size = bytes.len(), "annotating video upload");
            let mut spool = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(suffix)
                .tempfile()
                .map_err(AnnotateError::from)?;
            spool.write_all(bytes).map_err(AnnotateError::from)?;
            spool.flush().map_err(AnnotateError::from)?;

            let mut run = PipelineRun::new(detector, config.clone()).with_annotator(renderer);
            let video = run.run(spool.path())?;
            let bytes = fs::read(&video.path).map_err(AnnotateError::from)?;

            let extension = video
                .path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            Ok(Annotated::Video {
                bytes,
                media_type: media_type_for(&extension),
                filename: format!("annotated.{extension}"),
                frames: video.frame_count,
                summary: format_class_counts(&video.class_counts, detector.names()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_types() {
        assert_eq!(MediaType::parse("image/jpeg").unwrap(), MediaType::Image);
        assert_eq!(MediaType::parse("image/gif").unwrap(), MediaType::Image);
        assert_eq!(
            MediaType::parse("video/mp4").unwrap(),
            MediaType::Video { suffix: ".mp4" }
        );
        assert_eq!(
            MediaType::parse("Video/QuickTime; codecs=avc1").unwrap(),
            MediaType::Video { suffix: ".mov" }
        );
    }

    #[test]
    fn test_output_media_type_follows_extension() {
        assert_eq!(media_type_for("gif"), "image/gif");
        assert_eq!(media_type_for("mp4"), "video/mp4");
        assert_eq!(media_type_for("mkv"), "video/x-matroska");
        assert_eq!(media_type_for("mov"), "video/quicktime");
        assert_eq!(media_type_for("webm"), "video/webm");
        assert_eq!(media_type_for("bin"), "application/octet-stream");
    }

    #[test]
    fn test_unsupported_media() {
        for mime in ["text/plain", "application/pdf", "video/x-unknown", ""] {
            assert!(matches!(
                MediaType::parse(mime),
                Err(AnnotateError::UnsupportedMedia(_))
            ));
        }
    }

    #[test]
    fn test_upload_error_accessors() {
        let rejected = UploadError::from(AnnotateError::UnsupportedMedia("text/plain".to_string()));
        assert!(rejected.stage().is_none());
        assert!(matches!(rejected.error(), AnnotateError::UnsupportedMedia(_)));

        let run = UploadError::from(RunFailure {
            stage: Stage::Assembling,
            error: AnnotateError::EmptyFrameSequence,
        });
        assert_eq!(run.stage(), Some(Stage::Assembling));
        assert_eq!(run.to_string(), "assembly failed: Empty frame sequence: no frames to assemble");
    }
}
