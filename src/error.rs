// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the annotation library.

use thiserror::Error;

/// Result type alias for annotation operations.
pub type Result<T> = std::result::Result<T, AnnotateError>;

/// Main error type for the annotation library.
///
/// Every variant aborts the pipeline run it occurs in. None of them is retried.
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// The source video or image could not be opened or decoded.
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),
    /// The detector could not be invoked (missing weights, no session).
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),
    /// The detector was invoked but failed on an input.
    #[error("Inference error: {0}")]
    Inference(String),
    /// No frames were available to assemble.
    #[error("Empty frame sequence: no frames to assemble")]
    EmptyFrameSequence,
    /// A frame does not share the geometry of the first frame.
    #[error(
        "Frame geometry mismatch at frame {index}: expected {}x{}, found {}x{}",
        .expected.0, .expected.1, .found.0, .found.1
    )]
    FrameGeometryMismatch {
        /// Sequence index of the offending frame.
        index: usize,
        /// Geometry (width, height) of the first frame.
        expected: (u32, u32),
        /// Geometry (width, height) of the offending frame.
        found: (u32, u32),
    },
    /// Frame indices are not strictly ascending without gaps.
    #[error("Frame sequence gap: expected frame {expected}, found frame {found}")]
    FrameSequenceGap {
        /// Index that should have come next.
        expected: usize,
        /// Index that was found instead.
        found: usize,
    },
    /// The working directory could not be cleared or created.
    #[error("Working directory conflict: {0}")]
    WorkingDirectoryConflict(String),
    /// The declared media type is not handled.
    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),
    /// Error processing images.
    #[error("Image error: {0}")]
    ImageError(String),
    /// Video encoding or decoding error.
    #[error("Video error: {0}")]
    VideoError(String),
    /// Invalid configuration provided.
    #[error("Config error: {0}")]
    ConfigError(String),
    /// Feature not enabled at compile time.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(String),
    /// Wrapped `std::io::Error`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for AnnotateError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}

impl AnnotateError {
    /// Whether the error was caused by the input rather than by the environment.
    ///
    /// Used by the presentation layer to pick a status code.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::SourceUnreadable(_)
                | Self::EmptyFrameSequence
                | Self::FrameGeometryMismatch { .. }
                | Self::FrameSequenceGap { .. }
                | Self::UnsupportedMedia(_)
                | Self::ImageError(_)
        )
    }
}
