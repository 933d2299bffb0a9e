/// Region extraction: decode a screenshot, crop it to the requested search
/// region and remember the crop origin so detector output can be mapped back
/// to full-screenshot pixels.
use image::{DynamicImage, GenericImageView, GrayImage};

use crate::errors::{VisionError, VisionResult};
use crate::perception::types::BoundingBox;

/// Smallest region side (pixels) any detector will work on.
pub const MIN_REGION_SIDE: u32 = 10;

/// The working area handed to every detector.
#[derive(Debug, Clone)]
pub struct RegionFrame {
    /// Cropped pixels (the full image when no region was requested).
    pub image: DynamicImage,
    /// Crop origin in the full screenshot.
    pub offset_x: u32,
    pub offset_y: u32,
    /// Dimensions of the full screenshot.
    pub full_width: u32,
    pub full_height: u32,
}

impl RegionFrame {
    /// Decode `bytes` and crop to `region`.
    pub fn extract(bytes: &[u8], region: Option<&BoundingBox>) -> VisionResult<Self> {
        if bytes.is_empty() {
            return Err(VisionError::Decode("empty screenshot buffer".into()));
        }
        let img = image::load_from_memory(bytes)
            .map_err(|e| VisionError::Decode(format!("screenshot load: {e}")))?;
        Self::from_image(img, region)
    }

    /// Crop an already decoded image. Regions that extend past the image are
    /// rejected rather than clamped: clamping would shift the offset.
    pub fn from_image(img: DynamicImage, region: Option<&BoundingBox>) -> VisionResult<Self> {
        let (w, h) = img.dimensions();

        let Some(region) = region else {
            check_min_size(w, h)?;
            return Ok(Self {
                image: img,
                offset_x: 0,
                offset_y: 0,
                full_width: w,
                full_height: h,
            });
        };

        let out_of_bounds = region.x >= w
            || region.y >= h
            || region.x.checked_add(region.width).map_or(true, |r| r > w)
            || region.y.checked_add(region.height).map_or(true, |b| b > h);
        if out_of_bounds {
            return Err(VisionError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                image_width: w,
                image_height: h,
            });
        }
        check_min_size(region.width, region.height)?;

        let cropped = img.crop_imm(region.x, region.y, region.width, region.height);
        Ok(Self {
            image: cropped,
            offset_x: region.x,
            offset_y: region.y,
            full_width: w,
            full_height: h,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The crop expressed in full-screenshot coordinates.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.offset_x, self.offset_y, self.width(), self.height())
    }

    pub fn luma(&self) -> GrayImage {
        self.image.to_luma8()
    }

    /// Map a box measured on a working image scaled by (`scale_x`, `scale_y`)
    /// relative to this region back into full-screenshot space.
    ///
    /// The box is clipped to the region first; `None` when nothing is left.
    pub fn to_full_box(
        &self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        scale_x: f32,
        scale_y: f32,
    ) -> Option<BoundingBox> {
        if !(scale_x > 0.0 && scale_y > 0.0) {
            return None;
        }
        let x1 = (x / scale_x).round().max(0.0);
        let y1 = (y / scale_y).round().max(0.0);
        let x2 = ((x + width) / scale_x).round().min(self.width() as f32);
        let y2 = ((y + height) / scale_y).round().min(self.height() as f32);
        if !(x2 > x1 && y2 > y1) {
            return None;
        }
        BoundingBox::from_corners(x1 as u32, y1 as u32, x2 as u32, y2 as u32)
            .map(|b| b.translate(self.offset_x, self.offset_y))
    }

    /// Same as [`Self::to_full_box`] for boxes measured on the region itself.
    pub fn region_box_to_full(&self, b: &BoundingBox) -> Option<BoundingBox> {
        self.to_full_box(
            b.x as f32,
            b.y as f32,
            b.width as f32,
            b.height as f32,
            1.0,
            1.0,
        )
    }
}

fn check_min_size(width: u32, height: u32) -> VisionResult<()> {
    if width < MIN_REGION_SIDE || height < MIN_REGION_SIDE {
        return Err(VisionError::RegionTooSmall {
            width,
            height,
            min: MIN_REGION_SIDE,
        });
    }
    Ok(())
}

/// Working-image point → full-screenshot point: `p / scale + offset`.
pub fn to_full_point(x: f32, y: f32, scale: f32, offset: (u32, u32)) -> (f32, f32) {
    (x / scale + offset.0 as f32, y / scale + offset.1 as f32)
}
