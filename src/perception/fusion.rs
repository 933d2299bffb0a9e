/// Fusion of the raw candidate pool into one deduplicated, ranked list.
use serde::{Deserialize, Serialize};

use crate::perception::types::{BoundingBox, DetectedElement, DetectionMethod, ElementType};

pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// IoU above which two elements are the same control.
    pub overlap_threshold: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

/// Filter, deduplicate and rank `candidates`.
///
/// Candidates are processed in the given order. Each one either joins the
/// retained element it overlaps most (above the threshold) or is retained
/// itself. Output is sorted by confidence, descending; equal confidences keep
/// first-seen order. No two output elements overlap above the threshold.
pub fn fuse(candidates: Vec<DetectedElement>, confidence_threshold: f32, settings: &FusionSettings) -> Vec<DetectedElement> {
    let threshold = settings.overlap_threshold;
    let total = candidates.len();
    let mut retained: Vec<DetectedElement> = Vec::new();

    for candidate in candidates {
        if !candidate.confidence.is_finite()
            || candidate.confidence < confidence_threshold
            || candidate.coordinates.is_empty()
        {
            continue;
        }
        absorb(&mut retained, candidate, threshold);
    }

    retained.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    tracing::debug!(candidates = total, fused = retained.len(), "fusion complete");
    retained
}

fn absorb(retained: &mut Vec<DetectedElement>, incoming: DetectedElement, threshold: f32) {
    let Some(mut i) = best_overlap(retained, &incoming.coordinates, threshold, None) else {
        retained.push(incoming);
        return;
    };
    merge_into(&mut retained[i], incoming);

    // A replaced box may now overlap other retained elements.
    loop {
        let current = retained[i].coordinates;
        let Some(j) = best_overlap(retained, &current, threshold, Some(i)) else {
            break;
        };
        let (keep, drop) = if i < j { (i, j) } else { (j, i) };
        let removed = retained.remove(drop);
        merge_into(&mut retained[keep], removed);
        i = keep;
    }
}

/// Index of the retained element with maximum IoU above `threshold`;
/// ties resolve to the lowest index.
fn best_overlap(retained: &[DetectedElement], bbox: &BoundingBox, threshold: f32, skip: Option<usize>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, r) in retained.iter().enumerate() {
        if Some(i) == skip {
            continue;
        }
        let iou = r.coordinates.overlap_ratio(bbox);
        if iou > threshold && best.map_or(true, |(_, b)| iou > b) {
            best = Some((i, iou));
        }
    }
    best.map(|(i, _)| i)
}

/// Merge `other` into `target`. The higher confidence element survives,
/// `target` on ties. Text, a concrete type and method-specific metadata the
/// survivor lacks are taken from the other element.
fn merge_into(target: &mut DetectedElement, mut other: DetectedElement) {
    let mut methods = target.metadata.methods();
    for m in other.metadata.methods() {
        if !methods.contains(&m) {
            methods.push(m);
        }
    }

    if other.confidence > target.confidence {
        std::mem::swap(target, &mut other);
    }

    if target.text.is_none() {
        target.text = other.text.take();
    }
    if target.element_type == ElementType::Unknown && other.element_type != ElementType::Unknown {
        target.element_type = other.element_type;
    }

    let meta = &mut target.metadata;
    let from = other.metadata;
    meta.ocr_confidence = meta.ocr_confidence.or(from.ocr_confidence);
    meta.ocr_strategy = meta.ocr_strategy.take().or(from.ocr_strategy);
    meta.template_match = meta.template_match.or(from.template_match);
    meta.template_name = meta.template_name.take().or(from.template_name);
    meta.shape_area = meta.shape_area.or(from.shape_area);
    meta.aspect_ratio = meta.aspect_ratio.or(from.aspect_ratio);
    meta.remote_caption = meta.remote_caption.take().or(from.remote_caption);
    meta.interactable = meta.interactable.or(from.interactable);

    if methods.len() > 1 {
        meta.detection_method = DetectionMethod::Hybrid;
        meta.combined_methods = methods;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::ElementMetadata;

    fn el(id: &str, method: DetectionMethod, bbox: BoundingBox, confidence: f32) -> DetectedElement {
        DetectedElement::new(id.into(), ElementType::Unknown, bbox, confidence, ElementMetadata::new(method))
    }

    #[test]
    fn ocr_and_edge_on_same_control_become_hybrid() {
        let ocr = el("ocr_1", DetectionMethod::Ocr, BoundingBox::new(100, 100, 80, 30), 0.9).with_text("Submit");
        let edge = el("edge_1", DetectionMethod::Edge, BoundingBox::new(98, 98, 84, 34), 0.6);
        let out = fuse(vec![ocr, edge], 0.5, &FusionSettings::default());

        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.metadata.detection_method, DetectionMethod::Hybrid);
        assert_eq!(e.metadata.combined_methods, vec![DetectionMethod::Ocr, DetectionMethod::Edge]);
        assert_eq!(e.coordinates, BoundingBox::new(100, 100, 80, 30));
        assert_eq!(e.id, "ocr_1");
    }

    #[test]
    fn higher_confidence_box_wins_and_text_carries_over() {
        let ocr = el("ocr_1", DetectionMethod::Ocr, BoundingBox::new(100, 100, 80, 30), 0.55).with_text("Save");
        let tpl = el("tpl_1", DetectionMethod::Template, BoundingBox::new(101, 100, 80, 30), 0.95);
        let out = fuse(vec![ocr, tpl], 0.5, &FusionSettings::default());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "tpl_1");
        assert_eq!(out[0].coordinates.x, 101);
        assert_eq!(out[0].text.as_deref(), Some("Save"));
        assert!((out[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_first_seen() {
        let a = el("ocr_1", DetectionMethod::Ocr, BoundingBox::new(0, 0, 50, 20), 0.8);
        let b = el("edge_1", DetectionMethod::Edge, BoundingBox::new(1, 0, 50, 20), 0.8);
        let out = fuse(vec![a, b], 0.5, &FusionSettings::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "ocr_1");
    }

    #[test]
    fn same_method_overlap_is_not_hybrid() {
        let a = el("edge_1", DetectionMethod::Edge, BoundingBox::new(0, 0, 50, 20), 0.6);
        let b = el("edge_2", DetectionMethod::Edge, BoundingBox::new(1, 1, 50, 20), 0.6);
        let out = fuse(vec![a, b], 0.5, &FusionSettings::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata.detection_method, DetectionMethod::Edge);
        assert!(out[0].metadata.combined_methods.is_empty());
    }

    #[test]
    fn filters_low_confidence_and_empty_boxes() {
        let low = el("ocr_1", DetectionMethod::Ocr, BoundingBox::new(0, 0, 50, 20), 0.3);
        let empty = el("ocr_2", DetectionMethod::Ocr, BoundingBox::new(0, 0, 0, 20), 0.9);
        let ok = el("ocr_3", DetectionMethod::Ocr, BoundingBox::new(200, 0, 50, 20), 0.7);
        let out = fuse(vec![low, empty, ok], 0.5, &FusionSettings::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "ocr_3");
    }

    #[test]
    fn replacement_that_bridges_two_elements_merges_them() {
        let a = el("ocr_1", DetectionMethod::Ocr, BoundingBox::new(0, 0, 100, 20), 0.6);
        let b = el("edge_1", DetectionMethod::Edge, BoundingBox::new(30, 0, 100, 20), 0.6);
        let c = el("tpl_1", DetectionMethod::Template, BoundingBox::new(15, 0, 100, 20), 0.9);
        let out = fuse(vec![a, b, c], 0.5, &FusionSettings::default());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "tpl_1");
        assert_eq!(
            out[0].metadata.combined_methods,
            vec![DetectionMethod::Ocr, DetectionMethod::Template, DetectionMethod::Edge]
        );
    }

    #[test]
    fn output_sorted_by_confidence_stable() {
        let a = el("ocr_1", DetectionMethod::Ocr, BoundingBox::new(0, 0, 20, 20), 0.6);
        let b = el("ocr_2", DetectionMethod::Ocr, BoundingBox::new(100, 0, 20, 20), 0.9);
        let c = el("edge_1", DetectionMethod::Edge, BoundingBox::new(200, 0, 20, 20), 0.6);
        let ids: Vec<String> = fuse(vec![a, b, c], 0.5, &FusionSettings::default())
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["ocr_2", "ocr_1", "edge_1"]);
    }
}
