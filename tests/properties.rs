//! Property-based tests for fusion, coordinate mapping and click targets.

use image::DynamicImage;
use proptest::prelude::*;

use seeclaw_vision::perception::click::resolve_click_target;
use seeclaw_vision::perception::fusion::{fuse, FusionSettings};
use seeclaw_vision::perception::region::{to_full_point, RegionFrame};
use seeclaw_vision::perception::types::ElementMetadata;
use seeclaw_vision::{BoundingBox, DetectedElement, DetectionMethod, ElementType};

fn method() -> impl Strategy<Value = DetectionMethod> {
    prop_oneof![
        Just(DetectionMethod::Ocr),
        Just(DetectionMethod::Template),
        Just(DetectionMethod::Edge),
        Just(DetectionMethod::RemoteSemantic),
    ]
}

fn element_type() -> impl Strategy<Value = ElementType> {
    prop_oneof![
        Just(ElementType::Button),
        Just(ElementType::Input),
        Just(ElementType::Dropdown),
        Just(ElementType::Text),
        Just(ElementType::Icon),
        Just(ElementType::Unknown),
    ]
}

/// Candidates clustered in a small area so overlaps are common.
fn candidate() -> impl Strategy<Value = DetectedElement> {
    (0u32..200, 0u32..120, 1u32..80, 1u32..40, -0.5f32..1.5, method(), element_type()).prop_map(
        |(x, y, w, h, confidence, method, element_type)| {
            DetectedElement::new(
                format!("{}_{x}_{y}", method.id_prefix()),
                element_type,
                BoundingBox::new(x, y, w, h),
                confidence,
                ElementMetadata::new(method),
            )
        },
    )
}

proptest! {
    /// No two fused elements overlap above the threshold.
    #[test]
    fn fused_elements_never_overlap_above_threshold(
        candidates in prop::collection::vec(candidate(), 0..40),
        overlap in 0.3f32..0.9,
    ) {
        let settings = FusionSettings { overlap_threshold: overlap };
        let fused = fuse(candidates, 0.0, &settings);
        for (i, a) in fused.iter().enumerate() {
            for b in &fused[i + 1..] {
                prop_assert!(a.coordinates.overlap_ratio(&b.coordinates) <= overlap);
            }
        }
    }

    /// Confidences stay in [0, 1], pass the threshold and come out sorted.
    #[test]
    fn fused_confidences_are_ranked_and_in_range(
        candidates in prop::collection::vec(candidate(), 0..40),
        threshold in 0.0f32..1.0,
    ) {
        let total = candidates.len();
        let fused = fuse(candidates, threshold, &FusionSettings::default());
        prop_assert!(fused.len() <= total);
        for e in &fused {
            prop_assert!((0.0..=1.0).contains(&e.confidence));
            prop_assert!(e.confidence >= threshold);
        }
        for pair in fused.windows(2) {
            prop_assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    /// Fusing already-fused output changes nothing.
    #[test]
    fn fusion_is_stable_on_its_own_output(candidates in prop::collection::vec(candidate(), 0..30)) {
        let settings = FusionSettings::default();
        let once = fuse(candidates, 0.5, &settings);
        let twice = fuse(once.clone(), 0.5, &settings);
        prop_assert_eq!(once, twice);
    }

    /// Boxes measured on a scaled working image map back inside the region
    /// and the screenshot.
    #[test]
    fn mapped_boxes_stay_inside_region(
        (rx, ry, rw, rh) in (0u32..100, 0u32..100, 10u32..200, 10u32..200),
        scale in 0.5f32..3.0,
        (fx, fy, fw, fh) in (0.0f32..1.2, 0.0f32..1.2, 0.0f32..1.0, 0.0f32..1.0),
    ) {
        let region = BoundingBox::new(rx, ry, rw, rh);
        let frame = RegionFrame::from_image(DynamicImage::new_luma8(300, 300), Some(&region)).unwrap();
        let sw = rw as f32 * scale;
        let sh = rh as f32 * scale;
        if let Some(b) = frame.to_full_box(fx * sw, fy * sh, fw * sw, fh * sh, scale, scale) {
            prop_assert!(b.width > 0 && b.height > 0);
            prop_assert!(region.contains(&b));
            prop_assert!(b.fits_within(300, 300));
        }
    }

    /// Working-image point → full point inverts `(p - offset) * scale`.
    #[test]
    fn point_mapping_round_trips(
        (px, py) in (0.0f32..1000.0, 0.0f32..1000.0),
        (ox, oy) in (0u32..500, 0u32..500),
        scale in 0.5f32..3.0,
    ) {
        let wx = px * scale;
        let wy = py * scale;
        let (fx, fy) = to_full_point(wx, wy, scale, (ox, oy));
        prop_assert!((fx - (px + ox as f32)).abs() < 1e-2);
        prop_assert!((fy - (py + oy as f32)).abs() < 1e-2);
    }

    /// The primary click point always lies inside the element.
    #[test]
    fn primary_click_point_is_inside(
        (x, y, w, h) in (0u32..1000, 0u32..1000, 10u32..400, 1u32..200),
        element_type in element_type(),
        method in method(),
    ) {
        let bbox = BoundingBox::new(x, y, w, h);
        let e = DetectedElement::new("e".into(), element_type, bbox, 0.8, ElementMetadata::new(method));
        let target = resolve_click_target(&e);
        prop_assert!(bbox.contains_point(target.coordinates.x, target.coordinates.y));
        prop_assert!(target.fallback_coordinates.len() >= 2);
    }
}

#[test]
fn documented_round_trip() {
    assert_eq!(to_full_point(150.0, 90.0, 1.5, (100, 50)), (200.0, 110.0));
}
