/// Image transforms applied before each recognition pass.
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use crate::errors::{VisionError, VisionResult};
use crate::perception::cv;
use crate::perception::ocr::strategy::Preprocess;

/// Scale `gray` by `scale`, then apply `preprocess`.
///
/// Transforms that need the image-processing backend fall back to the scaled
/// image when it is not compiled in.
pub fn apply(gray: &GrayImage, preprocess: &Preprocess, scale: f32) -> VisionResult<GrayImage> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(VisionError::Decode("empty image".into()));
    }
    if !(scale.is_finite() && scale > 0.0) {
        return Err(VisionError::Config(format!("invalid strategy scale {scale}")));
    }
    let scaled = resize(gray, scale);

    let out = match preprocess {
        Preprocess::None => scaled,
        Preprocess::Clahe { clip_limit, tiles } => clahe(&scaled, *clip_limit, *tiles, *tiles),
        Preprocess::AdaptiveThreshold { block_radius } => adaptive_threshold(&scaled, *block_radius),
        Preprocess::Median { radius } => match cv::median(&scaled, *radius) {
            Ok(img) => img,
            Err(VisionError::EngineUnavailable(_)) => scaled,
            Err(e) => return Err(e),
        },
        Preprocess::Sharpen => match cv::sharpen(&scaled) {
            Ok(img) => img,
            Err(VisionError::EngineUnavailable(_)) => scaled,
            Err(e) => return Err(e),
        },
    };
    Ok(out)
}

fn resize(gray: &GrayImage, scale: f32) -> GrayImage {
    if (scale - 1.0).abs() < f32::EPSILON {
        return gray.clone();
    }
    let w = ((gray.width() as f32 * scale).round() as u32).max(1);
    let h = ((gray.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(gray, w, h, FilterType::CatmullRom)
}

// ── CLAHE ───────────────────────────────────────────────────────────────────

/// Contrast-limited adaptive histogram equalization.
///
/// `clip_limit` is relative to the mean bin height of a tile; clipped counts
/// are redistributed evenly. Pixels blend the mappings of the four nearest
/// tile centres. Clip limit and grid are clamped to at least 1.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let clip_limit = if clip_limit.is_finite() { clip_limit.max(1.0) } else { 1.0 };
    let tile_w = w.div_ceil(tiles_x.clamp(1, w));
    let tile_h = h.div_ceil(tiles_y.clamp(1, h));
    // Rounded-up tiles can cover the image in fewer than requested.
    let tx = w.div_ceil(tile_w);
    let ty = h.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tx * ty) as usize);
    for j in 0..ty {
        for i in 0..tx {
            let x0 = i * tile_w;
            let y0 = j * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |i: u32, j: u32| &luts[(j * tx + i) as usize];
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let (j1, j2, ay) = neighbours(fy, ty);
        for x in 0..w {
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let (i1, i2, ax) = neighbours(fx, tx);
            let v = gray.get_pixel(x, y)[0] as usize;
            let top = (1.0 - ax) * lut_at(i1, j1)[v] as f32 + ax * lut_at(i2, j1)[v] as f32;
            let bottom = (1.0 - ax) * lut_at(i1, j2)[v] as f32 + ax * lut_at(i2, j2)[v] as f32;
            let value = (1.0 - ay) * top + ay * bottom;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Lower/upper tile index and blend weight along one axis.
fn neighbours(f: f32, tiles: u32) -> (u32, u32, f32) {
    let base = f.floor();
    let weight = f - base;
    let last = tiles as i64 - 1;
    let lo = (base as i64).clamp(0, last) as u32;
    let hi = (base as i64 + 1).clamp(0, last) as u32;
    (lo, hi, weight)
}

fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let total: u32 = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; 256];
    if total == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let clip = ((clip_limit * total as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let bonus = excess / 256;
    let mut residual = excess % 256;
    for bin in hist.iter_mut() {
        *bin += bonus;
    }
    if residual > 0 {
        let step = (256 / residual).max(1) as usize;
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }

    let scale = 255.0 / total as f32;
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// ── Adaptive threshold ──────────────────────────────────────────────────────

/// Offset below the local mean still counted as background.
const THRESHOLD_BIAS: i64 = 5;

/// Binarize against the mean of the `(2r+1)²` neighbourhood (clipped at the
/// borders): pixels above `mean - bias` become white.
pub fn adaptive_threshold(gray: &GrayImage, block_radius: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let stride = w as usize + 1;
    let mut integral = vec![0i64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row = 0i64;
        for x in 0..w as usize {
            row += gray.get_pixel(x as u32, y as u32)[0] as i64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    let r = block_radius.max(1) as i64;
    GrayImage::from_fn(w, h, |x, y| {
        let x0 = (x as i64 - r).max(0) as usize;
        let y0 = (y as i64 - r).max(0) as usize;
        let x1 = ((x as i64 + r + 1).min(w as i64)) as usize;
        let y1 = ((y as i64 + r + 1).min(h as i64)) as usize;
        let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1] - integral[y1 * stride + x0]
            + integral[y0 * stride + x0];
        let count = ((x1 - x0) * (y1 - y0)) as i64;
        let p = gray.get_pixel(x, y)[0] as i64;
        if p * count > sum - THRESHOLD_BIAS * count {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
