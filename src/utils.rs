// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Utility functions for detection post-processing and reporting.

use std::collections::HashMap;

use crate::detector::Detection;

/// Calculate `IoU` (Intersection over Union) between two `[x1, y1, x2, y2]` boxes.
#[must_use]
pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = ((x2 - x1).max(0.0)) * ((y2 - y1).max(0.0));

    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Per-class Non-Maximum Suppression.
///
/// Only suppresses boxes within the same class. Returns indices of kept
/// detections, highest confidence first. NaN scores sort last.
#[must_use]
pub fn nms_per_class(detections: &[Detection], iou_threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..detections.len()).collect();
    indices.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .partial_cmp(&detections[a].confidence)
            .unwrap_or(std::cmp::Ordering::Less)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for &i in &indices {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &indices {
            if suppressed[j] || i == j || detections[j].class_id != detections[i].class_id {
                continue;
            }
            if calculate_iou(&detections[i].bbox, &detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Simple pluralization for common COCO class names.
#[must_use]
pub fn pluralize(word: &str) -> String {
    match word {
        "person" => "persons".to_string(),
        "bus" => "buses".to_string(),
        "knife" => "knives".to_string(),
        "mouse" => "mice".to_string(),
        "sheep" | "skis" => word.to_string(),
        _ => {
            if word.ends_with('s') || word.ends_with("ch") || word.ends_with("sh") {
                format!("{word}es")
            } else if word.ends_with('y') && !word.ends_with("ey") && !word.ends_with("ay") {
                format!("{}ies", &word[..word.len() - 1])
            } else {
                format!("{word}s")
            }
        }
    }
}

/// Count occurrences of each class ID, ordered by ascending ID.
#[must_use]
pub fn count_classes<I: IntoIterator<Item = usize>>(class_ids: I) -> Vec<(usize, usize)> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for id in class_ids {
        match counts.iter_mut().find(|(class_id, _)| *class_id == id) {
            Some((_, count)) => *count += 1,
            None => counts.push((id, 1)),
        }
    }
    counts.sort_by_key(|(class_id, _)| *class_id);
    counts
}

/// Format per-class counts (e.g., "4 persons, 1 bus"). Unknown IDs are reported as "object".
#[must_use]
pub fn format_class_counts(counts: &[(usize, usize)], names: &HashMap<usize, String>) -> String {
    counts
        .iter()
        .map(|(class_id, count)| {
            let class_name = names.get(class_id).map_or("object", String::as_str);
            let name = if *count > 1 {
                pluralize(class_name)
            } else {
                class_name.to_string()
            };
            format!("{count} {name}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Count detections per class and format them (e.g., "4 persons, 1 bus").
///
/// Classes are listed by ascending ID.
#[must_use]
pub fn format_detection_summary(detections: &[Detection], names: &HashMap<usize, String>) -> String {
    format_class_counts(&count_classes(detections.iter().map(|d| d.class_id)), names)
}
