// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX model metadata parsing.
//!
//! Ultralytics exports store their configuration as custom metadata properties,
//! one key per field (`task`, `stride`, `imgsz`, `names`, ...). Values are
//! Python literals such as `[640, 640]` or `{0: 'person', 1: 'bicycle'}`.

use std::collections::HashMap;

use crate::error::{AnnotateError, Result};

/// Keys read from the model's custom metadata.
pub const METADATA_KEYS: [&str; 5] = ["description", "task", "stride", "imgsz", "names"];

/// Metadata extracted from an Ultralytics YOLO ONNX model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Model description (e.g., "Ultralytics YOLO11n model trained on coco.yaml").
    pub description: String,
    /// Task the model was exported for. Only `detect` is accepted.
    pub task: String,
    /// Model stride (typically 32).
    pub stride: u32,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            task: "detect".to_string(),
            stride: 32,
            imgsz: (640, 640),
            names: HashMap::new(),
        }
    }
}

impl ModelMetadata {
    /// Build metadata from custom ONNX properties.
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::DetectorUnavailable`] if a value is malformed or
    /// the model was exported for a task other than detection.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut metadata = Self::default();

        if let Some(description) = properties.get("description") {
            metadata.description = unquote(description).to_string();
        }
        if let Some(task) = properties.get("task") {
            metadata.task = unquote(task).to_string();
        }
        if let Some(stride) = properties.get("stride") {
            metadata.stride = stride.trim().parse().map_err(|_| {
                AnnotateError::DetectorUnavailable(format!("Invalid stride in metadata: {stride}"))
            })?;
        }
        if let Some(imgsz) = properties.get("imgsz") {
            metadata.imgsz = parse_imgsz(imgsz)?;
        }
        if let Some(names) = properties.get("names") {
            metadata.names = parse_names(names);
        }

        if metadata.task != "detect" {
            return Err(AnnotateError::DetectorUnavailable(format!(
                "Model task '{}' is not supported, export a detection model",
                metadata.task
            )));
        }

        Ok(metadata)
    }

    /// Get the number of classes in this model.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }
}

/// Strip surrounding whitespace and quotes.
fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'').trim_matches('"')
}

/// Parse `[640, 640]` or a bare `640`.
fn parse_imgsz(value: &str) -> Result<(usize, usize)> {
    let invalid = || AnnotateError::DetectorUnavailable(format!("Invalid imgsz in metadata: {value}"));

    let sizes: Vec<usize> = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| invalid())?;

    match sizes.as_slice() {
        [size] => Ok((*size, *size)),
        [h, w] => Ok((*h, *w)),
        _ => Err(invalid()),
    }
}

/// Parse a Python dict such as `{0: 'person', 1: 'traffic light'}`.
///
/// Entries that do not start with a numeric key are skipped.
fn parse_names(value: &str) -> HashMap<usize, String> {
    let body = value.trim().trim_start_matches('{').trim_end_matches('}');

    body.split(',')
        .filter_map(|entry| {
            let (key, name) = entry.split_once(':')?;
            let class_id = key.trim().parse::<usize>().ok()?;
            Some((class_id, unquote(name).to_string()))
        })
        .collect()
}
