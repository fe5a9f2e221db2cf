// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame extraction stage.

use std::path::PathBuf;

use crate::error::Result;
use crate::frame::{Frame, FrameFormat, FrameName};
use crate::source::FrameReader;

/// Lazily decodes frames and persists each one as `frame_%04d.<ext>`.
///
/// The n-th frame read is written with index n. The iterator ends at end of
/// stream or after the first error, and cannot be restarted.
pub struct FrameExtractor<R> {
    reader: R,
    dir: PathBuf,
    format: FrameFormat,
    next_index: usize,
    finished: bool,
}

impl<R: FrameReader> FrameExtractor<R> {
    /// Create an extractor writing into `dir`, which must already exist.
    pub fn new<P: Into<PathBuf>>(reader: R, dir: P, format: FrameFormat) -> Self {
        Self {
            reader,
            dir: dir.into(),
            format,
            next_index: 1,
            finished: false,
        }
    }

    fn extract_next(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.reader.read_frame()? else {
            return Ok(None);
        };

        let index = self.next_index;
        let path = FrameName::new(index, self.format).path_in(&self.dir);
        image.save_with_format(&path, self.format.image_format())?;
        self.next_index += 1;

        tracing::debug!(index, path = %path.display(), "frame extracted");
        Ok(Some(Frame {
            index,
            path,
            width: image.width(),
            height: image.height(),
        }))
    }
}

impl<R: FrameReader> Iterator for FrameExtractor<R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let next = self.extract_next();
        if !matches!(next, Ok(Some(_))) {
            self.finished = true;
        }
        next.transpose()
    }
}

impl<R: FrameReader> std::iter::FusedIterator for FrameExtractor<R> {}
