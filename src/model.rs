// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO detector backed by ONNX Runtime.
//!
//! [`YoloDetector`] wraps an ONNX Runtime session for an Ultralytics detection
//! export. A process-wide instance is created once with [`init_detector`] and
//! shared with [`detector`]; nothing else mutates it afterwards.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use image::DynamicImage;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use crate::config::DetectParams;
use crate::detector::{Detection, Detector};
use crate::download::try_download_model;
use crate::error::{AnnotateError, Result};
use crate::metadata::{METADATA_KEYS, ModelMetadata};
use crate::postprocessing::postprocess_detect;
use crate::preprocessing::preprocess_image;

static DETECTOR: OnceLock<YoloDetector> = OnceLock::new();

/// YOLO object detector.
///
/// Running an ONNX session needs exclusive access, so the session sits behind a
/// mutex. Preprocessing and postprocessing happen outside the lock.
///
/// # Example
///
/// ```no_run
/// use video_annotate::{DetectParams, Detector, YoloDetector};
///
/// let detector = YoloDetector::load("yolo11n.onnx")?;
/// let image = image::open("bus.jpg")?;
/// let detections = detector.detect(&image, &DetectParams::default())?;
/// println!("Found {} objects", detections.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct YoloDetector {
    session: Mutex<Session>,
    metadata: ModelMetadata,
    input_name: String,
    output_name: String,
    model_path: String,
}

impl YoloDetector {
    /// Load a detection model from an ONNX file.
    ///
    /// A missing `yolo11n.onnx` is downloaded first. Class names, input size and
    /// stride are read from the model's custom metadata.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::DetectorUnavailable`] if the file cannot be found
    /// or downloaded, the session cannot be created, or the model is not a
    /// detection model.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            try_download_model(path)?;
        }

        let unavailable = |what: &str, e: ort::Error| {
            AnnotateError::DetectorUnavailable(format!("{what}: {e}"))
        };

        let session = Session::builder()
            .map_err(|e| unavailable("Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable("Failed to set optimization level", e))?
            .commit_from_file(path)
            .map_err(|e| unavailable("Failed to load model", e))?;

        let metadata = Self::extract_metadata(&session)?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| AnnotateError::DetectorUnavailable("Model has no outputs".to_string()))?;

        tracing::info!(
            model = %path.display(),
            classes = metadata.num_classes(),
            imgsz = ?metadata.imgsz,
            "detector loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            metadata,
            input_name,
            output_name,
            model_path: path.display().to_string(),
        })
    }

    /// Read the Ultralytics custom metadata properties.
    fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
        let model_metadata = session.metadata().map_err(|e| {
            AnnotateError::DetectorUnavailable(format!("Failed to get model metadata: {e}"))
        })?;

        let properties: HashMap<String, String> = METADATA_KEYS
            .iter()
            .filter_map(|key| match model_metadata.custom(key) {
                Ok(Some(value)) => Some(((*key).to_string(), value)),
                _ => None,
            })
            .collect();

        if properties.is_empty() {
            tracing::warn!("model carries no Ultralytics metadata, using defaults");
        }

        ModelMetadata::from_properties(&properties)
    }

    /// Run one inference on a dummy input to allocate buffers up front.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::Inference`] if the session fails to run.
    pub fn warmup(&self) -> Result<()> {
        let (h, w) = self.metadata.imgsz;
        let dummy = ndarray::Array4::<f32>::zeros((1, 3, h, w));
        self.run_inference(&dummy).map(|_| ())
    }

    /// Run the session on an NCHW tensor. Returns `(data, shape)` of the first output.
    fn run_inference(&self, input: &ndarray::Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous)
            .map_err(|e| AnnotateError::Inference(format!("Failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AnnotateError::DetectorUnavailable("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| AnnotateError::Inference(format!("Inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            AnnotateError::Inference(format!("Output '{}' not found", self.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AnnotateError::Inference(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        Ok((data.to_vec(), shape))
    }

    /// Number of classes the model was trained on.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.metadata.num_classes()
    }

    /// Input size (height, width) the model was exported with.
    #[must_use]
    pub const fn imgsz(&self) -> (usize, usize) {
        self.metadata.imgsz
    }

    /// Get the model metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Get the model path.
    #[must_use]
    pub fn model_path(&self) -> &str {
        &self.model_path
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image: &DynamicImage, params: &DetectParams) -> Result<Vec<Detection>> {
        let start = Instant::now();
        let target_size = params.imgsz.unwrap_or(self.metadata.imgsz);

        let preprocessed = preprocess_image(image, target_size);
        let (output, shape) = self.run_inference(&preprocessed.tensor)?;
        let detections = postprocess_detect(
            &output,
            &shape,
            self.metadata.num_classes(),
            &preprocessed,
            params,
        );

        tracing::trace!(
            detections = detections.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "inference"
        );
        Ok(detections)
    }

    fn names(&self) -> &HashMap<usize, String> {
        &self.metadata.names
    }
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("model_path", &self.model_path)
            .field("num_classes", &self.metadata.num_classes())
            .field("imgsz", &self.metadata.imgsz)
            .field("stride", &self.metadata.stride)
            .finish_non_exhaustive()
    }
}

/// Initialize the process-wide detector.
///
/// Later calls return the detector loaded by the first successful call; the
/// `path` argument is then ignored.
///
/// # Errors
///
/// Returns [`AnnotateError::DetectorUnavailable`] if the model cannot be loaded.
pub fn init_detector<P: AsRef<Path>>(path: P) -> Result<&'static YoloDetector> {
    if let Some(existing) = DETECTOR.get() {
        if existing.model_path != path.as_ref().display().to_string() {
            tracing::warn!(
                loaded = %existing.model_path,
                requested = %path.as_ref().display(),
                "detector already initialized, keeping the loaded model"
            );
        }
        return Ok(existing);
    }

    let loaded = YoloDetector::load(path)?;
    Ok(DETECTOR.get_or_init(|| loaded))
}

/// Get the process-wide detector.
///
/// # Errors
///
/// Returns [`AnnotateError::DetectorUnavailable`] if [`init_detector`] has not
/// succeeded yet.
pub fn detector() -> Result<&'static YoloDetector> {
    DETECTOR.get().ok_or_else(|| {
        AnnotateError::DetectorUnavailable("detector has not been initialized".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = YoloDetector::load("nonexistent.onnx");
        assert!(matches!(result, Err(AnnotateError::DetectorUnavailable(_))));
    }

    #[test]
    fn test_detector_uninitialized() {
        // Nothing in the unit tests initializes the singleton
        assert!(matches!(detector(), Err(AnnotateError::DetectorUnavailable(_))));
    }
}
