/// Click-point selection for detected elements.
use crate::perception::types::{ClickTarget, DetectedElement, ElementType, Point};

/// Inset (px) of the fallback points from the element's edges.
const FALLBACK_INSET: i32 = 10;

/// Primary point is the centre; text inputs are clicked near their left edge
/// (10 % in) and dropdowns near the right edge (90 % in), both at centre
/// height. Fallbacks are always `(x+10, y+10)` then `(right-10, centre_y)`.
pub fn resolve_click_target(element: &DetectedElement) -> ClickTarget {
    let b = &element.coordinates;
    let x = b.x as i32;
    let y = b.y as i32;
    let w = b.width as i32;
    let h = b.height as i32;
    let center_y = y + h / 2;

    let primary = match element.element_type {
        ElementType::Input => Point::new(x + (w as f32 * 0.1).round() as i32, center_y),
        ElementType::Dropdown => Point::new(x + (w as f32 * 0.9).round() as i32, center_y),
        _ => Point::new(x + w / 2, center_y),
    };

    ClickTarget {
        coordinates: primary,
        confidence: element.confidence,
        method: element.metadata.detection_method,
        fallback_coordinates: vec![
            Point::new(x + FALLBACK_INSET, y + FALLBACK_INSET),
            Point::new(x + w - FALLBACK_INSET, center_y),
        ],
    }
}
