use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle. `width` and `height` are always > 0 for
/// boxes produced by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from corner coordinates; `None` when the box would be empty.
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1, y1, x2 - x1, y2 - y1))
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> u32 {
        self.x + self.width / 2
    }

    pub fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0;
        }
        (ix2 - ix1) as u64 * (iy2 - iy1) as u64
    }

    /// Intersection over union.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union == 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x as i32
            && y >= self.y as i32
            && x < self.right() as i32
            && y < self.bottom() as i32
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    pub fn translate(&self, dx: u32, dy: u32) -> BoundingBox {
        BoundingBox::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = String;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid region '{s}': {e}"))?;
        match parts.as_slice() {
            [x, y, w, h] if *w > 0 && *h > 0 => Ok(BoundingBox::new(*x, *y, *w, *h)),
            [_, _, _, _] => Err(format!("region '{s}' must have non-zero width and height")),
            _ => Err(format!("region '{s}' must be x,y,width,height")),
        }
    }
}

/// Signed pixel coordinate in full-screenshot space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    Input,
    Link,
    Text,
    Icon,
    Dropdown,
    Checkbox,
    Unknown,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Button => "button",
            ElementType::Input => "input",
            ElementType::Link => "link",
            ElementType::Text => "text",
            ElementType::Icon => "icon",
            ElementType::Dropdown => "dropdown",
            ElementType::Checkbox => "checkbox",
            ElementType::Unknown => "unknown",
        }
    }
}

/// Provenance tag: which detector(s) produced an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    Ocr,
    Template,
    Edge,
    Hybrid,
    RemoteSemantic,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Ocr => "ocr",
            DetectionMethod::Template => "template",
            DetectionMethod::Edge => "edge",
            DetectionMethod::Hybrid => "hybrid",
            DetectionMethod::RemoteSemantic => "remote-semantic",
        }
    }

    /// Short prefix used for per-call element ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            DetectionMethod::Ocr => "ocr",
            DetectionMethod::Template => "tpl",
            DetectionMethod::Edge => "edge",
            DetectionMethod::Hybrid => "hyb",
            DetectionMethod::RemoteSemantic => "remote",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    pub detection_method: DetectionMethod,
    /// Raw OCR word confidence on the engine's 0–100 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_match: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_area: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactable: Option<bool>,
    /// Every method that contributed to this element after fusion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combined_methods: Vec<DetectionMethod>,
}

impl ElementMetadata {
    pub fn new(detection_method: DetectionMethod) -> Self {
        Self {
            detection_method,
            ocr_confidence: None,
            ocr_strategy: None,
            template_match: None,
            template_name: None,
            shape_area: None,
            aspect_ratio: None,
            remote_caption: None,
            interactable: None,
            combined_methods: Vec::new(),
        }
    }

    /// Methods this element stands for: the fused list, or just its own tag.
    pub fn methods(&self) -> Vec<DetectionMethod> {
        if self.combined_methods.is_empty() {
            vec![self.detection_method]
        } else {
            self.combined_methods.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedElement {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub coordinates: BoundingBox,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub description: String,
    pub metadata: ElementMetadata,
}

impl DetectedElement {
    /// Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(
        id: String,
        element_type: ElementType,
        coordinates: BoundingBox,
        confidence: f32,
        metadata: ElementMetadata,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            id,
            element_type,
            coordinates,
            confidence,
            text: None,
            description: String::new(),
            metadata,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.text = Some(text);
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn method(&self) -> DetectionMethod {
        self.metadata.detection_method
    }
}

/// Per-call detector switches and filtering threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub enable_ocr: bool,
    pub enable_shape: bool,
    pub enable_template: bool,
    pub enable_remote: bool,
    pub confidence_threshold: f32,
    pub search_region: Option<BoundingBox>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enable_ocr: true,
            enable_shape: true,
            enable_template: true,
            enable_remote: false,
            confidence_threshold: 0.5,
            search_region: None,
        }
    }
}

impl DetectionConfig {
    /// OCR only, everything else off.
    pub fn ocr_only() -> Self {
        Self {
            enable_ocr: true,
            enable_shape: false,
            enable_template: false,
            enable_remote: false,
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: BoundingBox) -> Self {
        self.search_region = Some(region);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniversalElementType {
    Button,
    TextInput,
    Clickable,
    MenuItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Submit,
    Cancel,
    Search,
    Login,
    Signup,
    Next,
    Back,
    Delete,
    Save,
    Edit,
}

/// Reduced-vocabulary projection of a [`DetectedElement`] for downstream
/// consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalUIElement {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: UniversalElementType,
    pub bounds: BoundingBox,
    pub click_point: Point,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_role: Option<SemanticRole>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickTarget {
    pub coordinates: Point,
    pub confidence: f32,
    pub method: DetectionMethod,
    pub fallback_coordinates: Vec<Point>,
}

/// What happened to one detector during a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorStatus {
    Used { count: usize },
    Disabled,
    Unavailable,
    Skipped { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorRun {
    pub detector: String,
    pub method: DetectionMethod,
    #[serde(flatten)]
    pub status: DetectorStatus,
    pub elapsed_ms: u64,
}

/// Fused result of one detection call plus per-detector provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub elements: Vec<DetectedElement>,
    pub detectors: Vec<DetectorRun>,
    pub image_width: u32,
    pub image_height: u32,
    pub offset: (u32, u32),
    /// Area that was searched, in screenshot pixels.
    pub region: BoundingBox,
    pub elapsed_ms: u64,
}

impl DetectionReport {
    pub fn empty() -> Self {
        Self {
            elements: Vec::new(),
            detectors: Vec::new(),
            image_width: 0,
            image_height: 0,
            offset: (0, 0),
            region: BoundingBox::new(0, 0, 0, 0),
            elapsed_ms: 0,
        }
    }
}
