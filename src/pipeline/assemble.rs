// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video assembly stage.

use std::fs;
use std::path::Path;

use crate::error::{AnnotateError, Result};
use crate::frame::{AnnotatedFrame, OutputVideo};
use crate::io::{FrameSink, open_writer};
use crate::utils::count_classes;

/// Encodes annotated frames into one video at a constant frame rate.
#[derive(Debug, Clone, Copy)]
pub struct VideoAssembler {
    fps: f32,
}

impl VideoAssembler {
    /// Create an assembler for the given output frame rate.
    #[must_use]
    pub const fn new(fps: f32) -> Self {
        Self { fps }
    }

    /// Encode `frames` into `target`, replacing any existing file.
    ///
    /// The sequence and the geometry of every frame are validated before the
    /// encoder is opened, so a rejected sequence never leaves a file behind.
    /// A failure while encoding removes the partial file.
    ///
    /// # Errors
    ///
    /// - [`AnnotateError::EmptyFrameSequence`] if `frames` is empty.
    /// - [`AnnotateError::FrameSequenceGap`] if indices are not `1, 2, 3, ...`.
    /// - [`AnnotateError::FrameGeometryMismatch`] if a frame differs in size from the first.
    /// - Encoder and I/O errors from writing the video.
    pub fn assemble(&self, frames: &[AnnotatedFrame], target: &Path) -> Result<OutputVideo> {
        if target.is_file() {
            fs::remove_file(target)?;
        }

        let (width, height) = validate_sequence(frames)?;

        let mut writer = open_writer(target, width, height, self.fps)?;
        if let Err(e) = write_all(writer.as_mut(), frames).and_then(|()| writer.finish()) {
            if let Err(cleanup) = fs::remove_file(target) {
                tracing::warn!(path = %target.display(), error = %cleanup, "failed to remove partial video");
            }
            return Err(e);
        }

        tracing::info!(
            path = %target.display(),
            frames = frames.len(),
            width,
            height,
            fps = self.fps,
            "video assembled"
        );

        Ok(OutputVideo {
            path: target.to_path_buf(),
            frame_count: frames.len(),
            width,
            height,
            fps: self.fps,
            class_counts: count_classes(frames.iter().flat_map(|f| f.class_ids.iter().copied())),
        })
    }
}

/// Check ordering and read every artifact's dimensions. Returns (width, height).
fn validate_sequence(frames: &[AnnotatedFrame]) -> Result<(u32, u32)> {
    let first = frames.first().ok_or(AnnotateError::EmptyFrameSequence)?;

    for (expected, frame) in (1..).zip(frames) {
        if frame.index != expected {
            return Err(AnnotateError::FrameSequenceGap {
                expected,
                found: frame.index,
            });
        }
    }

    let expected = image::image_dimensions(&first.path)?;
    for frame in &frames[1..] {
        let found = image::image_dimensions(&frame.path)?;
        if found != expected {
            return Err(AnnotateError::FrameGeometryMismatch {
                index: frame.index,
                expected,
                found,
            });
        }
    }

    Ok(expected)
}

fn write_all(writer: &mut dyn FrameSink, frames: &[AnnotatedFrame]) -> Result<()> {
    for frame in frames {
        let image = image::open(&frame.path)?.to_rgb8();
        writer.write_frame(&image)?;
    }
    Ok(())
}
