/// Edge-based shape detector: finds rectangular outlines that look like
/// buttons or text fields.
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{VisionError, VisionResult};
use crate::perception::cv::{self, EdgeParams};
use crate::perception::region::RegionFrame;
use crate::perception::traits::{element_id, Detector};
use crate::perception::types::{BoundingBox, DetectedElement, DetectionMethod, ElementMetadata, ElementType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeSettings {
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub dilate_radius: u8,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub confidence: f32,
}

impl Default for ShapeSettings {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_radius: 1,
            min_width: 20,
            max_width: 400,
            min_height: 15,
            max_height: 160,
            confidence: 0.6,
        }
    }
}

impl ShapeSettings {
    fn edge_params(&self) -> EdgeParams {
        EdgeParams {
            blur_sigma: self.blur_sigma,
            canny_low: self.canny_low,
            canny_high: self.canny_high,
            dilate_radius: self.dilate_radius,
        }
    }

    fn accepts(&self, b: &BoundingBox) -> bool {
        (self.min_width..=self.max_width).contains(&b.width)
            && (self.min_height..=self.max_height).contains(&b.height)
    }
}

/// Button: aspect 1.5–6 and 20–60 px tall. Input: aspect above 3 and
/// 15–40 px tall. Button wins where both apply.
pub fn classify_shape(width: u32, height: u32) -> ElementType {
    if height == 0 {
        return ElementType::Unknown;
    }
    let aspect = width as f32 / height as f32;
    if (1.5..=6.0).contains(&aspect) && (20..=60).contains(&height) {
        ElementType::Button
    } else if aspect > 3.0 && (15..=40).contains(&height) {
        ElementType::Input
    } else {
        ElementType::Unknown
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShapeDetector {
    settings: Arc<ShapeSettings>,
}

impl ShapeDetector {
    pub fn new(settings: ShapeSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

#[async_trait]
impl Detector for ShapeDetector {
    fn name(&self) -> &'static str {
        "edge"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Edge
    }

    async fn is_available(&self) -> bool {
        cv::AVAILABLE
    }

    async fn detect(&self, frame: &RegionFrame) -> VisionResult<Vec<DetectedElement>> {
        let gray = frame.luma();
        let settings = self.settings.clone();
        let rects = tokio::task::spawn_blocking(move || cv::outer_contour_rects(&gray, &settings.edge_params()))
            .await
            .map_err(|e| VisionError::EngineUnavailable(format!("edge join: {e}")))??;

        let mut elements = Vec::new();
        for rect in rects.iter().filter(|r| self.settings.accepts(r)) {
            let Some(bbox) = frame.region_box_to_full(rect) else {
                continue;
            };
            let element_type = classify_shape(bbox.width, bbox.height);
            let mut metadata = ElementMetadata::new(DetectionMethod::Edge);
            metadata.shape_area = Some(bbox.area());
            metadata.aspect_ratio = Some(bbox.aspect_ratio());
            elements.push(
                DetectedElement::new(
                    element_id(DetectionMethod::Edge, elements.len()),
                    element_type,
                    bbox,
                    self.settings.confidence,
                    metadata,
                )
                .with_description(format!("{} outline {}x{}", element_type.as_str(), bbox.width, bbox.height)),
            );
        }
        tracing::debug!(contours = rects.len(), kept = elements.len(), "edge detection complete");
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_aspect_and_height() {
        assert_eq!(classify_shape(100, 30), ElementType::Button);
        assert_eq!(classify_shape(300, 30), ElementType::Input);
        assert_eq!(classify_shape(200, 18), ElementType::Input);
        assert_eq!(classify_shape(40, 40), ElementType::Unknown);
        assert_eq!(classify_shape(100, 80), ElementType::Unknown);
    }

    #[test]
    fn size_window_is_inclusive() {
        let s = ShapeSettings::default();
        assert!(s.accepts(&BoundingBox::new(0, 0, 20, 15)));
        assert!(s.accepts(&BoundingBox::new(0, 0, 400, 160)));
        assert!(!s.accepts(&BoundingBox::new(0, 0, 19, 30)));
        assert!(!s.accepts(&BoundingBox::new(0, 0, 100, 161)));
    }

    #[cfg(feature = "cv")]
    #[tokio::test]
    async fn finds_drawn_button_outline() {
        use image::{DynamicImage, Luma, GrayImage};

        let mut img = GrayImage::from_pixel(320, 200, Luma([250]));
        for x in 60..180 {
            for y in [80u32, 81, 114, 115] {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        for y in 80..116 {
            for x in [60u32, 61, 178, 179] {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let region = BoundingBox::new(20, 40, 260, 140);
        let frame = RegionFrame::from_image(DynamicImage::ImageLuma8(img), Some(&region)).unwrap();
        let elements = ShapeDetector::default().detect(&frame).await.unwrap();

        let button = elements
            .iter()
            .find(|e| e.coordinates.width >= 110 && e.coordinates.width <= 130)
            .expect("button outline");
        assert!(button.coordinates.x >= 55 && button.coordinates.x <= 62);
        assert!(button.coordinates.y >= 75 && button.coordinates.y <= 82);
        assert_eq!(button.element_type, ElementType::Button);
        assert!((button.confidence - 0.6).abs() < 1e-6);
        assert!(button.id.starts_with("edge_"));
    }
}
