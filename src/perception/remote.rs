/// Remote semantic detector: posts the region to an element-parsing service
/// (`POST /parse`) after a health check (`GET /health`).
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{VisionError, VisionResult};
use crate::perception::ocr::keywords;
use crate::perception::region::RegionFrame;
use crate::perception::traits::{element_id, Detector};
use crate::perception::types::{BoundingBox, DetectedElement, DetectionMethod, ElementMetadata, ElementType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub detect_multiple: bool,
    /// OCR is aborted for the call when the service returns at least this
    /// many elements with mean confidence at or above
    /// `skip_ocr_min_confidence`.
    pub skip_ocr_min_elements: usize,
    pub skip_ocr_min_confidence: f32,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9989".into(),
            request_timeout_secs: 30,
            health_timeout_secs: 3,
            detect_multiple: true,
            skip_ocr_min_elements: 5,
            skip_ocr_min_confidence: 0.7,
        }
    }
}

impl RemoteSettings {
    /// Whether a remote result is strong enough to make OCR redundant.
    pub fn supersedes_ocr(&self, elements: &[DetectedElement]) -> bool {
        if elements.is_empty() || elements.len() < self.skip_ocr_min_elements {
            return false;
        }
        let mean = elements.iter().map(|e| e.confidence).sum::<f32>() / elements.len() as f32;
        mean >= self.skip_ocr_min_confidence
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    image: &'a str,
    detect_multiple: bool,
    include_som: bool,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    models_loaded: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub elements: Vec<RemoteElement>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub processing_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteElement {
    /// `[x, y, width, height]` in pixels of the posted image.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub center: Option<[f64; 2]>,
    pub confidence: f32,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub interactable: Option<bool>,
    #[serde(default)]
    pub content: Option<String>,
}

// ── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RemoteSemanticDetector {
    client: reqwest::Client,
    settings: RemoteSettings,
}

impl RemoteSemanticDetector {
    pub fn new(settings: RemoteSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    pub async fn health(&self) -> VisionResult<()> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(self.settings.health_timeout_secs.max(1)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VisionError::Remote(format!("health check returned {}", response.status())));
        }
        let health: HealthResponse = response.json().await?;
        if health.status != "healthy" || health.models_loaded == Some(false) {
            return Err(VisionError::Remote(format!(
                "service not ready (status {}, models_loaded {:?})",
                health.status, health.models_loaded
            )));
        }
        Ok(())
    }

    pub async fn parse(&self, frame: &RegionFrame) -> VisionResult<ParseResponse> {
        let mut png = Vec::new();
        frame.image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
        let body = ParseRequest {
            image: &encoded,
            detect_multiple: self.settings.detect_multiple,
            include_som: false,
        };

        let response = self
            .client
            .post(self.url("/parse"))
            .timeout(Duration::from_secs(self.settings.request_timeout_secs.max(1)))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(VisionError::Remote(format!("{}: {}", status, err_body)));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Detector for RemoteSemanticDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::RemoteSemantic
    }

    async fn is_available(&self) -> bool {
        match self.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(url = %self.settings.base_url, error = %e, "remote detector unavailable");
                false
            }
        }
    }

    async fn detect(&self, frame: &RegionFrame) -> VisionResult<Vec<DetectedElement>> {
        let parsed = self.parse(frame).await?;
        tracing::debug!(
            elements = parsed.elements.len(),
            reported = ?parsed.count,
            service_ms = ?parsed.processing_time_ms,
            "remote parse complete"
        );
        Ok(convert_elements(frame, &parsed.elements))
    }
}

/// Map service elements (posted-image pixels) into full-screenshot elements.
pub fn convert_elements(frame: &RegionFrame, remote: &[RemoteElement]) -> Vec<DetectedElement> {
    let mut out = Vec::with_capacity(remote.len());
    for r in remote {
        let [x, y, w, h] = r.bbox;
        if ![x, y, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }
        let Some(bbox) = frame.to_full_box(x as f32, y as f32, w as f32, h as f32, 1.0, 1.0) else {
            continue;
        };

        let content = r.content.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let caption = r.caption.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let element_type = match r.kind.as_deref() {
            Some("icon") => ElementType::Icon,
            _ => match content {
                Some(text) => keywords::classify_text(text, &bbox),
                None => ElementType::Unknown,
            },
        };

        let mut metadata = ElementMetadata::new(DetectionMethod::RemoteSemantic);
        metadata.remote_caption = caption.map(str::to_string);
        metadata.interactable = r.interactable;
        metadata.aspect_ratio = Some(bbox.aspect_ratio());

        let description = caption
            .or(content)
            .map(str::to_string)
            .unwrap_or_else(|| element_type.as_str().to_string());
        let mut element = DetectedElement::new(
            element_id(DetectionMethod::RemoteSemantic, out.len()),
            element_type,
            bbox,
            r.confidence,
            metadata,
        )
        .with_description(description);
        if let Some(text) = content {
            element = element.with_text(text);
        }
        out.push(element);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn frame() -> RegionFrame {
        let region = BoundingBox::new(100, 50, 300, 200);
        RegionFrame::from_image(DynamicImage::new_rgb8(640, 480), Some(&region)).unwrap()
    }

    #[test]
    fn converts_service_payload() {
        let payload = serde_json::json!({
            "elements": [
                {"bbox": [10, 20, 80, 30], "center": [50, 35], "confidence": 0.92, "type": "text",
                 "caption": null, "interactable": true, "content": "Submit", "source": "box_ocr_content_ocr",
                 "element_id": 0},
                {"bbox": [200, 150, 40, 40], "confidence": 0.81, "type": "icon",
                 "caption": "settings gear", "interactable": true, "content": null},
                {"bbox": [290, 190, 50, 50], "confidence": 0.7, "type": "icon", "content": null}
            ],
            "count": 3,
            "processing_time_ms": 812.5,
            "image_size": {"width": 300, "height": 200},
            "device": "cpu"
        });
        let parsed: ParseResponse = serde_json::from_value(payload).unwrap();
        let elements = convert_elements(&frame(), &parsed.elements);

        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].coordinates, BoundingBox::new(110, 70, 80, 30));
        assert_eq!(elements[0].element_type, ElementType::Button);
        assert_eq!(elements[0].text.as_deref(), Some("Submit"));
        assert_eq!(elements[1].element_type, ElementType::Icon);
        assert_eq!(elements[1].description, "settings gear");
        assert_eq!(elements[1].id, "remote_2");
        // Clipped to the posted region.
        assert_eq!(elements[2].coordinates, BoundingBox::new(390, 240, 10, 10));
    }

    #[test]
    fn supersedes_ocr_needs_count_and_confidence() {
        let settings = RemoteSettings::default();
        let make = |n: usize, c: f32| -> Vec<DetectedElement> {
            (0..n)
                .map(|i| {
                    DetectedElement::new(
                        element_id(DetectionMethod::RemoteSemantic, i),
                        ElementType::Icon,
                        BoundingBox::new(0, 0, 10, 10),
                        c,
                        ElementMetadata::new(DetectionMethod::RemoteSemantic),
                    )
                })
                .collect()
        };
        assert!(settings.supersedes_ocr(&make(5, 0.7)));
        assert!(!settings.supersedes_ocr(&make(4, 0.95)));
        assert!(!settings.supersedes_ocr(&make(6, 0.5)));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let detector = RemoteSemanticDetector::new(RemoteSettings {
            base_url: "http://127.0.0.1:9".into(),
            health_timeout_secs: 1,
            ..Default::default()
        });
        assert!(!detector.is_available().await);
    }
}
