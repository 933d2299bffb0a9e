/// Debug rendering of a detection result onto the screenshot.
///
/// Each element gets a rectangle coloured by detection method and its short
/// id (e.g. "OCR_1") drawn above it; click targets are marked with a
/// crosshair.
use std::io::Cursor;

use crate::errors::{VisionError, VisionResult};
use crate::perception::types::{ClickTarget, DetectedElement, DetectionMethod, Point};

const CROSSHAIR_ARM: i32 = 6;
const CROSSHAIR_COLOUR: [u8; 4] = [255, 0, 255, 255];

fn method_colour(method: DetectionMethod) -> [u8; 4] {
    match method {
        DetectionMethod::Ocr => [68, 200, 68, 220],
        DetectionMethod::Template => [255, 170, 0, 220],
        DetectionMethod::Edge => [68, 140, 255, 220],
        DetectionMethod::Hybrid => [255, 68, 68, 230],
        DetectionMethod::RemoteSemantic => [0, 220, 255, 220],
    }
}

/// Annotate `src_bytes` (PNG/JPEG) and return PNG bytes. Labels are drawn
/// at 2× on images wider than 1600 px.
pub fn annotate_image(
    src_bytes: &[u8],
    elements: &[DetectedElement],
    targets: &[ClickTarget],
) -> VisionResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| VisionError::Decode(format!("annotate load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, _) = canvas.dimensions();

    let label_scale: u32 = if w > 1600 { 2 } else { 1 };
    let box_thickness: i32 = if w > 1600 { 3 } else { 2 };

    for elem in elements {
        let b = &elem.coordinates;
        let x1 = b.x as i32;
        let y1 = b.y as i32;
        let x2 = b.right() as i32 - 1;
        let y2 = b.bottom() as i32 - 1;
        let col = method_colour(elem.metadata.detection_method);

        draw_rect(&mut canvas, x1, y1, x2, y2, col, box_thickness);

        let label_h_px = (5 * label_scale + 4 * label_scale) as i32;
        draw_label(&mut canvas, x1.max(0), (y1 - label_h_px).max(0), &elem.id, col, label_scale);
    }

    for target in targets {
        draw_crosshair(&mut canvas, target.coordinates, CROSSHAIR_COLOUR);
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
    tracing::debug!(elements = elements.len(), targets = targets.len(), "annotated screenshot");
    Ok(out)
}

/// Plain-text listing of `elements`, one per line.
pub fn build_element_list(elements: &[DetectedElement]) -> String {
    if elements.is_empty() {
        return "No UI elements detected.".to_string();
    }

    let mut lines = vec!["Detected elements:".to_string()];
    for e in elements {
        let text_part = match &e.text {
            Some(t) => format!(" \"{t}\""),
            None => String::new(),
        };
        let methods: Vec<&str> = e.metadata.methods().iter().map(|m| m.as_str()).collect();
        lines.push(format!(
            "  - [{}] {} ({:.0}%) at {}{} via {}",
            e.id,
            e.element_type.as_str(),
            e.confidence * 100.0,
            e.coordinates,
            text_part,
            methods.join("+"),
        ));
    }
    lines.join("\n")
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(canvas: &mut image::RgbaImage, x1: i32, y1: i32, x2: i32, y2: i32, col: [u8; 4], thickness: i32) {
    for t in 0..thickness {
        for x in x1..=x2 {
            put(canvas, x, y1 + t, col);
            put(canvas, x, y2 - t, col);
        }
        for y in y1..=y2 {
            put(canvas, x1 + t, y, col);
            put(canvas, x2 - t, y, col);
        }
    }
}

fn draw_crosshair(canvas: &mut image::RgbaImage, p: Point, col: [u8; 4]) {
    for d in -CROSSHAIR_ARM..=CROSSHAIR_ARM {
        put(canvas, p.x + d, p.y, col);
        put(canvas, p.x, p.y + d, col);
    }
}

fn draw_label(canvas: &mut image::RgbaImage, x: i32, y: i32, text: &str, col: [u8; 4], scale: u32) {
    let step = (5 * scale + scale) as i32;
    let pad = (2 * scale) as i32;
    let label_w = text.chars().count() as i32 * step + pad * 2;
    let label_h = (5 * scale) as i32 + pad * 2;

    // Darken the background under the label.
    for dy in 0..label_h {
        for dx in 0..label_w {
            let (px, py) = (x + dx, y + dy);
            if in_bounds(canvas, px, py) {
                let p = canvas.get_pixel_mut(px as u32, py as u32);
                p[0] = (p[0] as f32 * 0.2) as u8;
                p[1] = (p[1] as f32 * 0.2) as u8;
                p[2] = (p[2] as f32 * 0.2) as u8;
                p[3] = 255;
            }
        }
    }

    for (i, c) in text.to_uppercase().chars().enumerate() {
        draw_glyph(canvas, c, x + pad + i as i32 * step, y + pad, col, scale);
    }
}

fn glyph(c: char) -> Option<[u8; 5]> {
    Some(match c {
        '0'..='9' => MINI_FONT[(c as u8 - b'0') as usize],
        'A'..='Z' => MINI_FONT[10 + (c as u8 - b'A') as usize],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '-' => [0b00000, 0b00000, 0b11111, 0b00000, 0b00000],
        ' ' => [0; 5],
        _ => return None,
    })
}

fn draw_glyph(canvas: &mut image::RgbaImage, c: char, px: i32, py: i32, col: [u8; 4], scale: u32) {
    let Some(rows) = glyph(c) else {
        return;
    };
    let s = scale as i32;
    for (row, &bits) in rows.iter().enumerate() {
        for bit in 0..5i32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..s {
                for sx in 0..s {
                    put(canvas, px + bit * s + sx, py + row as i32 * s + sy, col);
                }
            }
        }
    }
}

fn in_bounds(canvas: &image::RgbaImage, x: i32, y: i32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height()
}

/// Alpha-blend `col` at `(x, y)`; off-canvas points are ignored.
fn put(canvas: &mut image::RgbaImage, x: i32, y: i32, col: [u8; 4]) {
    if !in_bounds(canvas, x, y) {
        return;
    }
    let p = canvas.get_pixel_mut(x as u32, y as u32);
    let a = col[3] as f32 / 255.0;
    for c in 0..3 {
        p[c] = (p[c] as f32 * (1.0 - a) + col[c] as f32 * a).round() as u8;
    }
    p[3] = 255;
}

/// 5×5 bitmap glyphs: digits 0-9, letters A-Z.
const MINI_FONT: [[u8; 5]; 36] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
    [0b01110, 0b10001, 0b11111, 0b10001, 0b10001], // A
    [0b11110, 0b10001, 0b11110, 0b10001, 0b11110], // B
    [0b01110, 0b10000, 0b10000, 0b10000, 0b01110], // C
    [0b11100, 0b10010, 0b10001, 0b10010, 0b11100], // D
    [0b11111, 0b10000, 0b11110, 0b10000, 0b11111], // E
    [0b11111, 0b10000, 0b11110, 0b10000, 0b10000], // F
    [0b01110, 0b10000, 0b10011, 0b10001, 0b01110], // G
    [0b10001, 0b10001, 0b11111, 0b10001, 0b10001], // H
    [0b01110, 0b00100, 0b00100, 0b00100, 0b01110], // I
    [0b00111, 0b00010, 0b00010, 0b10010, 0b01100], // J
    [0b10001, 0b10010, 0b11100, 0b10010, 0b10001], // K
    [0b10000, 0b10000, 0b10000, 0b10000, 0b11111], // L
    [0b10001, 0b11011, 0b10101, 0b10001, 0b10001], // M
    [0b10001, 0b11001, 0b10101, 0b10011, 0b10001], // N
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // O
    [0b11110, 0b10001, 0b11110, 0b10000, 0b10000], // P
    [0b01110, 0b10001, 0b10101, 0b10010, 0b01101], // Q
    [0b11110, 0b10001, 0b11110, 0b10010, 0b10001], // R
    [0b01111, 0b10000, 0b01110, 0b00001, 0b11110], // S
    [0b11111, 0b00100, 0b00100, 0b00100, 0b00100], // T
    [0b10001, 0b10001, 0b10001, 0b10001, 0b01110], // U
    [0b10001, 0b10001, 0b10001, 0b01010, 0b00100], // V
    [0b10001, 0b10001, 0b10101, 0b11011, 0b10001], // W
    [0b10001, 0b01010, 0b00100, 0b01010, 0b10001], // X
    [0b10001, 0b01010, 0b00100, 0b00100, 0b00100], // Y
    [0b11111, 0b00010, 0b00100, 0b01000, 0b11111], // Z
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::click::resolve_click_target;
    use crate::perception::types::{BoundingBox, ElementMetadata, ElementType};

    fn blank_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn element() -> DetectedElement {
        DetectedElement::new(
            "ocr_1".into(),
            ElementType::Button,
            BoundingBox::new(40, 40, 80, 30),
            0.9,
            ElementMetadata::new(DetectionMethod::Ocr),
        )
        .with_text("Submit")
    }

    #[test]
    fn draws_box_and_crosshair() {
        let e = element();
        let target = resolve_click_target(&e);
        let png = annotate_image(&blank_png(200, 120), &[e], &[target.clone()]).unwrap();
        let out = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (200, 120));

        // Box edge is no longer white.
        assert_ne!(out.get_pixel(60, 40).0, [255, 255, 255, 255]);
        // Crosshair centre.
        let c = target.coordinates;
        assert_ne!(out.get_pixel(c.x as u32, c.y as u32).0, [255, 255, 255, 255]);
        // Far corner untouched.
        assert_eq!(out.get_pixel(199, 119).0, [255, 255, 255, 255]);
    }

    #[test]
    fn boxes_at_the_edge_do_not_panic() {
        let e = DetectedElement::new(
            "edge_1".into(),
            ElementType::Unknown,
            BoundingBox::new(0, 0, 50, 50),
            0.6,
            ElementMetadata::new(DetectionMethod::Edge),
        );
        let target = resolve_click_target(&e);
        annotate_image(&blank_png(50, 50), &[e], &[target]).unwrap();
    }

    #[test]
    fn undecodable_input_is_an_error() {
        assert!(matches!(annotate_image(b"nope", &[], &[]), Err(VisionError::Decode(_))));
    }

    #[test]
    fn element_list_lists_methods() {
        assert_eq!(build_element_list(&[]), "No UI elements detected.");
        let list = build_element_list(&[element()]);
        assert!(list.contains("[ocr_1] button (90%) at 40,40 80x30 \"Submit\" via ocr"));
    }
}
