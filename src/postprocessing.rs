// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing for YOLO detection outputs.
//!
//! Detection heads output `[1, 4 + nc, N]` (or the transposed `[1, N, 4 + nc]`)
//! where each prediction is `cx, cy, w, h` followed by one score per class.

use ndarray::{Array2, ArrayView2, s};

use crate::config::DetectParams;
use crate::detector::Detection;
use crate::preprocessing::{PreprocessResult, clip_coords, scale_coords};
use crate::utils::nms_per_class;

/// Decode a raw detection output into detections in source image pixels.
///
/// Applies the confidence threshold, maps boxes back through the letterbox,
/// runs per-class NMS and keeps at most `params.max_detections`.
#[must_use]
pub fn postprocess_detect(
    output: &[f32],
    output_shape: &[usize],
    expected_classes: usize,
    preprocess: &PreprocessResult,
    params: &DetectParams,
) -> Vec<Detection> {
    let (num_classes, num_predictions, is_transposed) =
        parse_detect_shape(output_shape, expected_classes);

    if output.is_empty() || num_predictions == 0 {
        return Vec::new();
    }

    let num_features = 4 + num_classes;
    let predictions = if is_transposed {
        Array2::from_shape_vec((num_predictions, num_features), output.to_vec()).ok()
    } else {
        Array2::from_shape_vec((num_features, num_predictions), output.to_vec())
            .ok()
            .map(|arr| arr.t().to_owned())
    };

    let Some(predictions) = predictions else {
        return Vec::new();
    };

    let candidates = extract_candidates(predictions.view(), preprocess, params);
    nms_per_class(&candidates, params.iou)
        .into_iter()
        .take(params.max_detections)
        .map(|i| candidates[i])
        .collect()
}

/// Parse the detection output shape.
///
/// Returns `(num_classes, num_predictions, is_transposed)`. When the model
/// carries no class names (`expected_classes == 0`) the class count is inferred
/// from the smaller dimension.
fn parse_detect_shape(shape: &[usize], expected_classes: usize) -> (usize, usize, bool) {
    let (a, b) = match shape {
        [a, b] | [_, a, b] => (*a, *b),
        _ => return (expected_classes.max(1), 0, false),
    };

    if a.max(b) < 5 || a.min(b) == 0 {
        return (expected_classes.max(1), 0, false);
    }

    if expected_classes == 0 {
        let (num_features, num_preds, transposed) = if a < b { (a, b, false) } else { (b, a, true) };
        return (num_features.saturating_sub(4).max(1), num_preds, transposed);
    }

    if a == 4 + expected_classes {
        (expected_classes, b, false)
    } else if b == 4 + expected_classes {
        (expected_classes, a, true)
    } else if a < b {
        (a.saturating_sub(4).max(1), b, false)
    } else {
        (b.saturating_sub(4).max(1), a, true)
    }
}

/// Score every prediction and keep the ones above the confidence threshold.
fn extract_candidates(
    predictions: ArrayView2<'_, f32>,
    preprocess: &PreprocessResult,
    params: &DetectParams,
) -> Vec<Detection> {
    let mut candidates = Vec::new();

    for row in predictions.rows() {
        // NaN scores rank lowest
        let (best_class, best_score) = row
            .slice(s![4..])
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less))
            .map_or((0, 0.0), |(idx, &score)| (idx, if score.is_nan() { 0.0 } else { score }));

        if best_score < params.confidence {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let xyxy = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];
        let scaled = scale_coords(&xyxy, preprocess.scale, preprocess.padding);
        let bbox = clip_coords(&scaled, preprocess.orig_shape);

        candidates.push(Detection::new(bbox, best_score, best_class));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn identity_preprocess() -> PreprocessResult {
        PreprocessResult {
            tensor: Array4::zeros((1, 3, 1, 1)),
            orig_shape: (640, 640),
            scale: (1.0, 1.0),
            padding: (0.0, 0.0),
        }
    }

    #[test]
    fn test_parse_detect_shape() {
        assert_eq!(parse_detect_shape(&[1, 84, 8400], 80), (80, 8400, false));
        assert_eq!(parse_detect_shape(&[1, 8400, 84], 80), (80, 8400, true));
        assert_eq!(parse_detect_shape(&[84, 8400], 80), (80, 8400, false));
    }

    #[test]
    fn test_parse_detect_shape_no_metadata() {
        assert_eq!(parse_detect_shape(&[1, 84, 8400], 0), (80, 8400, false));
        assert_eq!(parse_detect_shape(&[1, 8400, 6], 0), (2, 8400, true));
    }

    #[test]
    fn test_empty_output() {
        let detections = postprocess_detect(
            &[],
            &[1, 84, 0],
            80,
            &identity_preprocess(),
            &DetectParams::default(),
        );
        assert!(detections.is_empty());
    }

    #[test]
    fn test_decode_and_suppress() {
        // [1, 6, 3] layout: rows are cx, cy, w, h, score_cls0, score_cls1
        #[rustfmt::skip]
        let output = vec![
            100.0, 102.0, 400.0, // cx
            100.0, 102.0, 400.0, // cy
             50.0,  50.0,  20.0, // w
             50.0,  50.0,  20.0, // h
              0.9,   0.8,   0.1, // class 0
              0.0,   0.1,   0.7, // class 1
        ];
        let detections = postprocess_detect(
            &output,
            &[1, 6, 3],
            2,
            &identity_preprocess(),
            &DetectParams::default(),
        );

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 0);
        assert!((detections[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(detections[0].bbox, [75.0, 75.0, 125.0, 125.0]);
        assert_eq!(detections[1].class_id, 1);
    }

    #[test]
    fn test_nan_scores_handled() {
        let output = vec![10.0, 10.0, 5.0, 5.0, f32::NAN];
        let detections = postprocess_detect(
            &output,
            &[1, 1, 5],
            1,
            &identity_preprocess(),
            &DetectParams::default(),
        );
        assert!(detections.is_empty());
    }

    #[test]
    fn test_max_detections() {
        #[rustfmt::skip]
        let output = vec![
            10.0, 200.0, 400.0,
            10.0, 200.0, 400.0,
             5.0,   5.0,   5.0,
             5.0,   5.0,   5.0,
             0.9,   0.8,   0.7,
        ];
        let params = DetectParams::default().with_max_detections(2);
        let detections = postprocess_detect(&output, &[1, 5, 3], 1, &identity_preprocess(), &params);
        assert_eq!(detections.len(), 2);
    }
}
