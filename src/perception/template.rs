/// Template detector: locates known control glyphs (reference images) in the
/// region by normalized cross-correlation.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::errors::{VisionError, VisionResult};
use crate::perception::cv;
use crate::perception::ocr::keywords;
use crate::perception::region::RegionFrame;
use crate::perception::traits::{element_id, Detector};
use crate::perception::types::{BoundingBox, DetectedElement, DetectionMethod, ElementMetadata, ElementType};

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// Directory of PNG/JPEG reference images. `name.png` or
    /// `name.<type>.png` (e.g. `install.button.png`).
    pub directory: Option<PathBuf>,
    pub match_threshold: f32,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            directory: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub image: GrayImage,
    pub element_type: Option<ElementType>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: Vec<Template>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, image: GrayImage, element_type: Option<ElementType>) -> VisionResult<()> {
        let name = name.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::Template(format!("template '{name}' is empty")));
        }
        self.templates.push(Template {
            name,
            image,
            element_type,
        });
        Ok(())
    }

    /// Load every PNG/JPEG in `dir`, in file-name order. Unreadable files are
    /// skipped with a warning.
    pub fn load_dir(dir: &Path) -> VisionResult<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| VisionError::Template(format!("read {}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let (name, element_type) = split_stem(stem);
            match image::open(&path) {
                Ok(img) => library.add(name, img.to_luma8(), element_type)?,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable template"),
            }
        }
        tracing::info!(dir = %dir.display(), count = library.len(), "templates loaded");
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }
}

/// `install.button` → ("install", Some(Button)); `install` → ("install", None).
fn split_stem(stem: &str) -> (String, Option<ElementType>) {
    if let Some((name, suffix)) = stem.rsplit_once('.') {
        if let Some(t) = parse_element_type(suffix) {
            return (name.to_string(), Some(t));
        }
    }
    (stem.to_string(), None)
}

fn parse_element_type(s: &str) -> Option<ElementType> {
    match s.to_ascii_lowercase().as_str() {
        "button" => Some(ElementType::Button),
        "input" => Some(ElementType::Input),
        "link" => Some(ElementType::Link),
        "text" => Some(ElementType::Text),
        "icon" => Some(ElementType::Icon),
        "dropdown" => Some(ElementType::Dropdown),
        "checkbox" => Some(ElementType::Checkbox),
        _ => None,
    }
}

/// Declared type, else the keyword classifier on the name. Names that read
/// as plain text are treated as icons.
fn template_type(template: &Template, bbox: &BoundingBox) -> ElementType {
    if let Some(t) = template.element_type {
        return t;
    }
    match keywords::classify_text(&template.name.replace(['_', '-'], " "), bbox) {
        ElementType::Text | ElementType::Unknown => ElementType::Icon,
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct TemplateDetector {
    library: Arc<TemplateLibrary>,
    threshold: f32,
}

impl TemplateDetector {
    pub fn new(library: TemplateLibrary) -> Self {
        Self {
            library: Arc::new(library),
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }
}

#[async_trait]
impl Detector for TemplateDetector {
    fn name(&self) -> &'static str {
        "template"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Template
    }

    async fn is_available(&self) -> bool {
        cv::AVAILABLE && !self.library.is_empty()
    }

    async fn detect(&self, frame: &RegionFrame) -> VisionResult<Vec<DetectedElement>> {
        let gray = frame.luma();
        let library = self.library.clone();
        let hits = tokio::task::spawn_blocking(move || -> VisionResult<Vec<(usize, cv::TemplateHit)>> {
            let mut hits = Vec::new();
            for (i, template) in library.iter().enumerate() {
                if let Some(hit) = cv::best_template_match(&gray, &template.image)? {
                    tracing::trace!(template = %template.name, score = hit.score, "best template location");
                    hits.push((i, hit));
                }
            }
            Ok(hits)
        })
        .await
        .map_err(|e| VisionError::Template(format!("join: {e}")))??;

        let mut elements = Vec::new();
        for (i, hit) in hits {
            if hit.score <= self.threshold {
                continue;
            }
            let Some(template) = self.library.templates.get(i) else {
                continue;
            };
            let local = BoundingBox::new(hit.x, hit.y, template.image.width(), template.image.height());
            let Some(bbox) = frame.region_box_to_full(&local) else {
                continue;
            };
            let element_type = template_type(template, &bbox);
            let mut metadata = ElementMetadata::new(DetectionMethod::Template);
            metadata.template_match = Some(hit.score);
            metadata.template_name = Some(template.name.clone());
            metadata.aspect_ratio = Some(bbox.aspect_ratio());
            elements.push(
                DetectedElement::new(
                    element_id(DetectionMethod::Template, elements.len()),
                    element_type,
                    bbox,
                    hit.score,
                    metadata,
                )
                .with_description(format!("{} matching template '{}'", element_type.as_str(), template.name)),
            );
        }
        tracing::debug!(templates = self.library.len(), matched = elements.len(), "template detection complete");
        Ok(elements)
    }
}
