use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Search region {x},{y} {width}x{height} exceeds image bounds {image_width}x{image_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Region {width}x{height} is below the minimum usable size {min}x{min}")]
    RegionTooSmall { width: u32, height: u32, min: u32 },

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Text recognition error: {0}")]
    Recognition(String),

    #[error("Strategy '{name}' failed: {reason}")]
    Strategy { name: String, reason: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Remote detection error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Detection cancelled")]
    Cancelled,
}

impl serde::Serialize for VisionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type VisionResult<T> = Result<T, VisionError>;
