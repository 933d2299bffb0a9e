/// Pixel-level image processing backed by `imageproc`.
///
/// Compiled only with the `cv` feature. Without it every operation returns
/// `EngineUnavailable`, so edge and template detectors report themselves as
/// unavailable and OCR preprocessing falls back to the untouched image.
use image::GrayImage;

use crate::errors::VisionResult;
use crate::perception::types::BoundingBox;

/// Whether the image-processing backend was compiled in.
pub const AVAILABLE: bool = cfg!(feature = "cv");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeParams {
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub dilate_radius: u8,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_radius: 1,
        }
    }
}

/// Best template location and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateHit {
    pub x: u32,
    pub y: u32,
    /// Zero-mean correlation coefficient in [-1, 1].
    pub score: f32,
}

// ── imageproc implementation ────────────────────────────────────────────────

#[cfg(feature = "cv")]
mod imp {
    use super::*;
    use crate::errors::VisionError;
    use imageproc::contours::{find_contours, BorderType};
    use imageproc::distance_transform::Norm;
    use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

    /// Bounding rectangles of outer edge contours, in image coordinates.
    /// Duplicate rectangles (nested borders of the same control) are removed.
    pub fn outer_contour_rects(gray: &GrayImage, params: &EdgeParams) -> VisionResult<Vec<BoundingBox>> {
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }
        let blurred = imageproc::filter::gaussian_blur_f32(gray, params.blur_sigma.max(0.1));
        let edges = imageproc::edges::canny(&blurred, params.canny_low, params.canny_high);
        let edges = if params.dilate_radius > 0 {
            imageproc::morphology::dilate(&edges, Norm::LInf, params.dilate_radius)
        } else {
            edges
        };

        let mut rects: Vec<BoundingBox> = Vec::new();
        for contour in find_contours::<u32>(&edges) {
            if contour.border_type != BorderType::Outer || contour.points.is_empty() {
                continue;
            }
            let (mut x1, mut y1, mut x2, mut y2) = (u32::MAX, u32::MAX, 0u32, 0u32);
            for p in &contour.points {
                x1 = x1.min(p.x);
                y1 = y1.min(p.y);
                x2 = x2.max(p.x);
                y2 = y2.max(p.y);
            }
            // Contour points are inclusive pixel positions.
            if let Some(b) = BoundingBox::from_corners(x1, y1, x2 + 1, y2 + 1) {
                if !rects.contains(&b) {
                    rects.push(b);
                }
            }
        }
        Ok(rects)
    }

    pub fn best_template_match(image: &GrayImage, template: &GrayImage) -> VisionResult<Option<TemplateHit>> {
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 {
            return Err(VisionError::Template("empty template".into()));
        }
        if tw > image.width() || th > image.height() {
            return Ok(None);
        }
        let scores = match_template(image, template, MatchTemplateMethod::CrossCorrelationNormalized);
        let extremes = find_extremes(&scores);
        let (x, y) = extremes.max_value_location;
        let score = zero_mean_correlation(image, template, x, y);
        Ok(Some(TemplateHit { x, y, score }))
    }

    pub fn median(gray: &GrayImage, radius: u32) -> VisionResult<GrayImage> {
        Ok(imageproc::filter::median_filter(gray, radius, radius))
    }

    pub fn sharpen(gray: &GrayImage) -> VisionResult<GrayImage> {
        Ok(imageproc::filter::sharpen3x3(gray))
    }
}

// ── Stub (no cv feature) ────────────────────────────────────────────────────

#[cfg(not(feature = "cv"))]
mod imp {
    use super::*;
    use crate::errors::VisionError;

    fn unavailable<T>() -> VisionResult<T> {
        Err(VisionError::EngineUnavailable(
            "image processing backend not compiled in (enable the `cv` feature)".into(),
        ))
    }

    pub fn outer_contour_rects(_gray: &GrayImage, _params: &EdgeParams) -> VisionResult<Vec<BoundingBox>> {
        unavailable()
    }

    pub fn best_template_match(_image: &GrayImage, _template: &GrayImage) -> VisionResult<Option<TemplateHit>> {
        unavailable()
    }

    pub fn median(_gray: &GrayImage, _radius: u32) -> VisionResult<GrayImage> {
        unavailable()
    }

    pub fn sharpen(_gray: &GrayImage) -> VisionResult<GrayImage> {
        unavailable()
    }
}

pub use imp::{best_template_match, median, outer_contour_rects, sharpen};

/// Pearson correlation between `template` and the window of `image` at
/// (`x`, `y`). Flat windows or templates score 0.
pub fn zero_mean_correlation(image: &GrayImage, template: &GrayImage, x: u32, y: u32) -> f32 {
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || x + tw > image.width() || y + th > image.height() {
        return 0.0;
    }
    let n = (tw * th) as f64;
    let (mut sum_i, mut sum_t) = (0.0f64, 0.0f64);
    for ty in 0..th {
        for tx in 0..tw {
            sum_i += image.get_pixel(x + tx, y + ty)[0] as f64;
            sum_t += template.get_pixel(tx, ty)[0] as f64;
        }
    }
    let (mean_i, mean_t) = (sum_i / n, sum_t / n);

    let (mut cov, mut var_i, mut var_t) = (0.0f64, 0.0f64, 0.0f64);
    for ty in 0..th {
        for tx in 0..tw {
            let di = image.get_pixel(x + tx, y + ty)[0] as f64 - mean_i;
            let dt = template.get_pixel(tx, ty)[0] as f64 - mean_t;
            cov += di * dt;
            var_i += di * di;
            var_t += dt * dt;
        }
    }
    let denom = (var_i * var_t).sqrt();
    if denom < 1e-9 {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn patterned(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let v = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)).wrapping_mul(83_492_791);
            Luma([(v >> 24) as u8])
        })
    }

    #[test]
    fn correlation_of_window_with_itself_is_one() {
        let img = patterned(40, 30);
        let tpl = image::imageops::crop_imm(&img, 5, 4, 12, 10).to_image();
        assert!((zero_mean_correlation(&img, &tpl, 5, 4) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn flat_template_scores_zero() {
        let img = patterned(40, 30);
        let tpl = GrayImage::from_pixel(8, 8, Luma([200]));
        assert_eq!(zero_mean_correlation(&img, &tpl, 0, 0), 0.0);
    }

    #[test]
    fn out_of_range_window_scores_zero() {
        let img = patterned(20, 20);
        let tpl = patterned(8, 8);
        assert_eq!(zero_mean_correlation(&img, &tpl, 15, 15), 0.0);
    }

    #[cfg(feature = "cv")]
    #[test]
    fn template_is_found_at_its_origin() {
        let img = patterned(60, 40);
        let tpl = image::imageops::crop_imm(&img, 21, 9, 14, 11).to_image();
        let hit = best_template_match(&img, &tpl).unwrap().unwrap();
        assert!(hit.score > 0.99);
        assert_eq!((hit.x, hit.y), (21, 9));
    }

    #[cfg(feature = "cv")]
    #[test]
    fn oversized_template_is_skipped() {
        let img = patterned(10, 10);
        let tpl = patterned(20, 5);
        assert!(best_template_match(&img, &tpl).unwrap().is_none());
    }

    #[cfg(feature = "cv")]
    #[test]
    fn rectangle_outline_yields_one_rect() {
        let mut img = GrayImage::from_pixel(200, 120, Luma([255]));
        for x in 40..160 {
            for y in [40u32, 41, 79, 80] {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 40..81 {
            for x in [40u32, 41, 158, 159] {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let rects = outer_contour_rects(&img, &EdgeParams::default()).unwrap();
        assert!(rects
            .iter()
            .any(|r| r.width >= 110 && r.width <= 130 && r.height >= 35 && r.height <= 50));
    }

    #[cfg(not(feature = "cv"))]
    #[test]
    fn stub_reports_unavailable() {
        let img = patterned(20, 20);
        assert!(outer_contour_rects(&img, &EdgeParams::default()).is_err());
        assert!(!AVAILABLE);
    }
}
