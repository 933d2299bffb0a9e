use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{VisionError, VisionResult};
use crate::perception::fusion::FusionSettings;
use crate::perception::ocr::strategy::{default_strategies, ScoreWeights, Strategy};
use crate::perception::ocr::tesseract::TesseractSettings;
use crate::perception::ocr::{DEFAULT_EARLY_EXIT, DEFAULT_JOIN_GAP_FACTOR};
use crate::perception::remote::RemoteSettings;
use crate::perception::search::SearchSettings;
use crate::perception::semantic::SemanticSettings;
use crate::perception::shape::ShapeSettings;
use crate::perception::template::TemplateSettings;
use crate::perception::types::DetectionConfig;

pub const CONFIG_FILE_NAME: &str = "vision.toml";
/// Overrides the config search when set.
pub const CONFIG_ENV_VAR: &str = "SEECLAW_VISION_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Defaults for each detection call.
    pub detection: DetectionConfig,
    pub fusion: FusionSettings,
    pub ocr: OcrSettings,
    pub shape: ShapeSettings,
    pub template: TemplateSettings,
    pub remote: RemoteSettings,
    pub semantic: SemanticSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub tesseract: TesseractSettings,
    /// Evaluated in order until one scores at or above `early_exit`.
    pub strategies: Vec<Strategy>,
    pub scoring: ScoreWeights,
    pub early_exit: f32,
    pub join_gap_factor: f32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract: TesseractSettings::default(),
            strategies: default_strategies(),
            scoring: ScoreWeights::default(),
            early_exit: DEFAULT_EARLY_EXIT,
            join_gap_factor: DEFAULT_JOIN_GAP_FACTOR,
        }
    }
}

fn unit_range(name: &str, value: f32) -> VisionResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(VisionError::Config(format!("{name} must be within [0, 1], got {value}")));
    }
    Ok(())
}

impl VisionConfig {
    pub fn validate(&self) -> VisionResult<()> {
        unit_range("detection.confidence_threshold", self.detection.confidence_threshold)?;
        unit_range("fusion.overlap_threshold", self.fusion.overlap_threshold)?;
        unit_range("ocr.early_exit", self.ocr.early_exit)?;
        unit_range("remote.skip_ocr_min_confidence", self.remote.skip_ocr_min_confidence)?;
        unit_range("template.match_threshold", self.template.match_threshold)?;
        unit_range("shape.confidence", self.shape.confidence)?;

        for s in &self.ocr.strategies {
            if !(s.scale.is_finite() && s.scale > 0.0) {
                return Err(VisionError::Config(format!(
                    "strategy '{}' has invalid scale {}",
                    s.name, s.scale
                )));
            }
            if !(0.0..=100.0).contains(&s.min_confidence) {
                return Err(VisionError::Config(format!(
                    "strategy '{}' min_confidence must be within [0, 100]",
                    s.name
                )));
            }
        }
        if self.ocr.join_gap_factor.is_nan() || self.ocr.join_gap_factor < 0.0 {
            return Err(VisionError::Config("ocr.join_gap_factor must be >= 0".into()));
        }
        if self.shape.min_width > self.shape.max_width || self.shape.min_height > self.shape.max_height {
            return Err(VisionError::Config("shape size window is inverted".into()));
        }
        if self.search.min_score.is_nan() || self.search.min_score < 0.0 {
            return Err(VisionError::Config("search.min_score must be >= 0".into()));
        }
        Ok(())
    }
}

/// Locate the config file: explicit path, then `$SEECLAW_VISION_CONFIG`,
/// then next to the executable, the working directory and finally the user
/// config directory (`<config_dir>/seeclaw/vision.toml`).
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
        if !value.trim().is_empty() {
            tracing::debug!(path = %value, "config path from environment");
            return Some(PathBuf::from(value));
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in working directory");
            return Some(candidate);
        }
    }

    let candidate = user_config_path()?;
    candidate.exists().then_some(candidate)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("seeclaw").join(CONFIG_FILE_NAME))
}

/// Load and validate the configuration. Without a file anywhere on the search
/// path the defaults are returned; an explicit or env-provided path that does
/// not exist is an error.
pub fn load_config(explicit: Option<&Path>) -> VisionResult<VisionConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        tracing::debug!("no config file found, using defaults");
        return Ok(VisionConfig::default());
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> VisionResult<VisionConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| VisionError::Config(format!("read {}: {e}", path.display())))?;
    let config: VisionConfig = toml::from_str(&content)?;
    config.validate()?;
    tracing::info!(
        path = %path.display(),
        strategies = config.ocr.strategies.len(),
        remote = config.detection.enable_remote,
        "config loaded"
    );
    Ok(config)
}

/// Write `config` as pretty TOML to `explicit`, the resolved config path, or
/// the user config directory. Returns the path written.
pub fn save_config(config: &VisionConfig, explicit: Option<&Path>) -> VisionResult<PathBuf> {
    config.validate()?;
    let path = resolve_config_path(explicit)
        .or_else(user_config_path)
        .ok_or_else(|| VisionError::Config("no location available for config file".into()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(path)
}
