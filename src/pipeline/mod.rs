// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame-based video annotation pipeline.
//!
//! A [`PipelineRun`] drives three sequential stages over a scratch
//! [`WorkDir`]:
//!
//! 1. [`FrameExtractor`] decodes the source into `frames/frame_%04d.png`.
//! 2. [`FrameAnnotator`] runs the detector on every frame into `annotated/`.
//! 3. [`VideoAssembler`] encodes the annotated frames at a fixed frame rate.
//!
//! Stages hand each other explicit manifests (`Vec<Frame>`,
//! `Vec<AnnotatedFrame>`). Any stage error aborts the run, and the working
//! directory is removed whether the run succeeds or fails.
//!
//! # Example
//!
//! ```no_run
//! use video_annotate::{PipelineConfig, PipelineRun, init_detector};
//!
//! let detector = init_detector("yolo11n.onnx")?;
//! let mut run = PipelineRun::new(detector, PipelineConfig::default().with_output("out.gif"));
//! let video = run.run("input.gif")?;
//! println!("{} frames -> {}", video.frame_count, video.path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod annotator;
pub mod assemble;
pub mod extract;
pub mod workdir;

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Instant;

use thiserror::Error;

pub use annotator::FrameAnnotator;
pub use assemble::VideoAssembler;
pub use extract::FrameExtractor;
pub use workdir::WorkDir;

use crate::annotate::Annotator;
use crate::config::PipelineConfig;
use crate::detector::Detector;
use crate::error::{AnnotateError, Result};
use crate::frame::{AnnotatedFrame, Frame, OutputVideo};
use crate::source::{FrameReader, open_reader};

/// Stage of a run, used to report where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Validating configuration and creating the working directory.
    Preparing,
    /// Decoding source frames.
    Extracting,
    /// Running the detector on frames.
    Annotating,
    /// Encoding the output video.
    Assembling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preparing => "preparation",
            Self::Extracting => "extraction",
            Self::Annotating => "annotation",
            Self::Assembling => "assembly",
        })
    }
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Idle,
    /// Working directory ready, decoding frames.
    Extracting,
    /// All frames extracted, detecting.
    Annotating,
    /// All frames annotated, encoding.
    Assembling,
    /// Output video written.
    Done,
    /// Aborted in the given stage.
    Failed {
        /// Stage that raised the error.
        stage: Stage,
    },
}

impl RunState {
    /// Whether the run has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// A failed run: the stage it failed in and the reason.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct RunFailure {
    /// Stage that raised the error.
    pub stage: Stage,
    /// Underlying error.
    #[source]
    pub error: AnnotateError,
}

/// One video annotation run.
pub struct PipelineRun<'a, D: ?Sized> {
    detector: &'a D,
    config: PipelineConfig,
    renderer: Annotator,
    state: RunState,
    history: Vec<RunState>,
}

impl<'a, D: Detector + ?Sized> PipelineRun<'a, D> {
    /// Create a run using `detector` and `config`.
    pub fn new(detector: &'a D, config: PipelineConfig) -> Self {
        Self {
            detector,
            config,
            renderer: Annotator::new(),
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    /// Use a specific renderer for overlays.
    #[must_use]
    pub fn with_annotator(mut self, renderer: Annotator) -> Self {
        self.renderer = renderer;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Every state the last run went through, starting with `Idle`.
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Annotate the video at `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] naming the stage that failed. The working
    /// directory is removed and no output video is left behind.
    pub fn run<P: AsRef<Path>>(&mut self, source: P) -> std::result::Result<OutputVideo, RunFailure> {
        let source = source.as_ref();
        tracing::info!(source = %source.display(), "starting pipeline run");
        self.execute(Some(source), || open_reader(source))
    }

    /// Annotate the frames produced by `reader`.
    ///
    /// # Errors
    ///
    /// Same as [`PipelineRun::run`].
    pub fn run_reader<R: FrameReader>(&mut self, reader: R) -> std::result::Result<OutputVideo, RunFailure> {
        self.execute(None, || Ok(reader))
    }

    fn execute<R, F>(&mut self, source: Option<&Path>, open: F) -> std::result::Result<OutputVideo, RunFailure>
    where
        R: FrameReader,
        F: FnOnce() -> Result<R>,
    {
        let start = Instant::now();
        self.state = RunState::Idle;
        self.history = vec![RunState::Idle];

        self.prepare_output(source).map_err(|e| self.fail(Stage::Preparing, e))?;
        let work = WorkDir::prepare(&self.config.work_dir).map_err(|e| self.fail(Stage::Preparing, e))?;
        self.transition(RunState::Extracting);

        let result = self.stages(&work, open);

        if let Err(e) = work.cleanup() {
            tracing::warn!(dir = %self.config.work_dir.display(), error = %e, "failed to remove working directory");
        }

        match result {
            Ok(video) => {
                self.transition(RunState::Done);
                tracing::info!(
                    path = %video.path.display(),
                    frames = video.frame_count,
                    elapsed_s = start.elapsed().as_secs_f64(),
                    "pipeline run finished"
                );
                Ok(video)
            }
            Err(failure) => {
                tracing::error!(%failure, "pipeline run failed");
                Err(failure)
            }
        }
    }

    /// Validate the configuration and drop the previous run's output.
    ///
    /// Nothing is deleted when `source` lives inside the working directory.
    fn prepare_output(&self, source: Option<&Path>) -> Result<()> {
        self.config.validate()?;
        if let Some(source) = source
            && is_within(source, &self.config.work_dir)
        {
            return Err(AnnotateError::WorkingDirectoryConflict(format!(
                "source {} is inside the working directory {}",
                source.display(),
                self.config.work_dir.display()
            )));
        }
        let output = &self.config.output_path;
        if output.is_file() {
            fs::remove_file(output)?;
        }
        Ok(())
    }

    fn stages<R, F>(&mut self, work: &WorkDir, open: F) -> std::result::Result<OutputVideo, RunFailure>
    where
        R: FrameReader,
        F: FnOnce() -> Result<R>,
    {
        let reader = open().map_err(|e| self.fail(Stage::Extracting, e))?;
        if let Some(native) = reader.frame_rate() {
            tracing::debug!(native_fps = native, output_fps = self.config.fps, "source opened");
        }

        let frames: Vec<Frame> = FrameExtractor::new(reader, work.frames_dir(), self.config.frame_format)
            .collect::<Result<_>>()
            .map_err(|e| self.fail(Stage::Extracting, e))?;
        if frames.is_empty() {
            return Err(self.fail(Stage::Extracting, AnnotateError::EmptyFrameSequence));
        }
        tracing::info!(frames = frames.len(), "extraction complete");
        self.transition(RunState::Annotating);

        let annotated = {
            let annotator =
                FrameAnnotator::new(self.detector, &self.renderer, self.config.params, work.annotated_dir())
                    .with_format(self.config.frame_format)
                    .with_workers(self.config.workers);
            annotator.annotate(&frames)
        }
        .map_err(|e| self.fail(Stage::Annotating, e))?;
        let detections: usize = annotated.iter().map(AnnotatedFrame::detections).sum();
        tracing::info!(frames = annotated.len(), detections, "annotation complete");
        self.transition(RunState::Assembling);

        VideoAssembler::new(self.config.fps)
            .assemble(&annotated, &self.config.output_path)
            .map_err(|e| self.fail(Stage::Assembling, e))
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, stage: Stage, error: AnnotateError) -> RunFailure {
        self.transition(RunState::Failed { stage });
        RunFailure { stage, error }
    }
}

/// Whether `path` resolves to a location inside `dir`.
///
/// Paths that do not exist are compared as given.
fn is_within(path: &Path, dir: &Path) -> bool {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    path.starts_with(dir)
}

impl<D: ?Sized> fmt::Debug for PipelineRun<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRun")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectParams;
    use crate::detector::Detection;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::collections::HashMap;

    struct NoDetections(HashMap<usize, String>);

    impl Detector for NoDetections {
        fn detect(&self, _: &DynamicImage, _: &DetectParams) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn names(&self) -> &HashMap<usize, String> {
            &self.0
        }
    }

    struct Frames(Vec<RgbImage>);

    impl FrameReader for Frames {
        fn read_frame(&mut self) -> Result<Option<RgbImage>> {
            Ok(self.0.pop())
        }

        fn frame_rate(&self) -> Option<f32> {
            None
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig::new()
            .with_work_dir(root.join("work"))
            .with_output(root.join("output.gif"))
    }

    #[test]
    fn test_successful_run_history() {
        let tmp = tempfile::tempdir().unwrap();
        let detector = NoDetections(HashMap::new());
        let mut run = PipelineRun::new(&detector, config(tmp.path())).with_annotator(Annotator::without_font());

        let reader = Frames(vec![RgbImage::from_pixel(6, 4, Rgb([1, 2, 3])); 3]);
        let video = run.run_reader(reader).unwrap();

        assert_eq!(video.frame_count, 3);
        assert_eq!(run.state(), RunState::Done);
        assert_eq!(
            run.history(),
            &[
                RunState::Idle,
                RunState::Extracting,
                RunState::Annotating,
                RunState::Assembling,
                RunState::Done
            ]
        );
        assert!(!tmp.path().join("work").exists());
    }

    #[test]
    fn test_empty_source_fails_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let detector = NoDetections(HashMap::new());
        let mut run = PipelineRun::new(&detector, config(tmp.path()));

        let failure = run.run_reader(Frames(Vec::new())).unwrap_err();
        assert_eq!(failure.stage, Stage::Extracting);
        assert!(matches!(failure.error, AnnotateError::EmptyFrameSequence));
        assert_eq!(run.state(), RunState::Failed { stage: Stage::Extracting });
        assert!(run.state().is_terminal());
        assert!(!tmp.path().join("output.gif").exists());
        assert!(!tmp.path().join("work").exists());
    }

    #[test]
    fn test_invalid_config_fails_preparing() {
        let tmp = tempfile::tempdir().unwrap();
        let detector = NoDetections(HashMap::new());
        let mut run = PipelineRun::new(&detector, config(tmp.path()).with_fps(0.0));

        let failure = run.run_reader(Frames(Vec::new())).unwrap_err();
        assert_eq!(failure.stage, Stage::Preparing);
        assert!(failure.to_string().starts_with("preparation failed: Config error"));
    }

    #[test]
    fn test_source_inside_work_dir_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let source = work.join("clip.gif");
        fs::write(&source, b"user data").unwrap();

        let detector = NoDetections(HashMap::new());
        let mut run = PipelineRun::new(&detector, config(tmp.path()));
        let failure = run.run(&source).unwrap_err();

        assert_eq!(failure.stage, Stage::Preparing);
        assert!(matches!(failure.error, AnnotateError::WorkingDirectoryConflict(_)));
        assert_eq!(fs::read(&source).unwrap(), b"user data");
    }

    #[test]
    fn test_is_within() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        fs::create_dir_all(work.join("frames")).unwrap();

        assert!(is_within(&work.join("frames"), &work));
        assert!(is_within(&work.join("frames/../frames"), &work));
        assert!(!is_within(&tmp.path().join("clip.gif"), &work));
        assert!(!is_within(&tmp.path().join("work2/clip.gif"), &work));
    }
}
