/// Text-recognition engine abstraction and the shared, lazily probed handle.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::errors::{VisionError, VisionResult};
use crate::perception::warn::WarningLog;

/// Identifies the OCR layout line a word belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LineKey {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

/// One recognized word. Box is in working-image (preprocessed, scaled) space.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// 0–100.
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub line: LineKey,
}

impl OcrWord {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }
}

/// Per-strategy recognition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrParams {
    pub page_seg_mode: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
}

impl OcrParams {
    pub fn psm(page_seg_mode: u8) -> Self {
        Self {
            page_seg_mode,
            whitelist: None,
            blacklist: None,
            dpi: Some(300),
        }
    }
}

impl Default for OcrParams {
    fn default() -> Self {
        Self::psm(3)
    }
}

/// A text-recognition backend.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify the backend can run; returns a version/description string.
    async fn probe(&self) -> VisionResult<String>;

    async fn recognize(&self, image: &GrayImage, params: &OcrParams) -> VisionResult<Vec<OcrWord>>;

    /// Free backend resources. Called at most once by [`OcrEngineHandle`].
    async fn release(&self) {}
}

/// Shared OCR engine: probed once on first use, released once on shutdown.
pub struct OcrEngineHandle {
    recognizer: Arc<dyn TextRecognizer>,
    availability: OnceCell<bool>,
    released: AtomicBool,
    warnings: Arc<WarningLog>,
}

impl OcrEngineHandle {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self::with_warnings(recognizer, Arc::new(WarningLog::new()))
    }

    pub fn with_warnings(recognizer: Arc<dyn TextRecognizer>, warnings: Arc<WarningLog>) -> Self {
        Self {
            recognizer,
            availability: OnceCell::new(),
            released: AtomicBool::new(false),
            warnings,
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.recognizer.name()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub async fn is_available(&self) -> bool {
        if self.is_released() {
            return false;
        }
        *self
            .availability
            .get_or_init(|| async {
                match self.recognizer.probe().await {
                    Ok(version) => {
                        tracing::info!(engine = self.recognizer.name(), version = %version, "OCR engine ready");
                        true
                    }
                    Err(e) => {
                        self.warnings
                            .warn(self.recognizer.name(), &format!("OCR engine unavailable: {e}"));
                        false
                    }
                }
            })
            .await
    }

    pub async fn recognize(&self, image: &GrayImage, params: &OcrParams) -> VisionResult<Vec<OcrWord>> {
        if self.is_released() {
            return Err(VisionError::EngineUnavailable(format!(
                "{} has been shut down",
                self.recognizer.name()
            )));
        }
        self.recognizer.recognize(image, params).await
    }

    /// Release the engine. Returns `false` if it was already released.
    pub async fn shutdown(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!(engine = self.recognizer.name(), "OCR engine already released");
            return false;
        }
        self.recognizer.release().await;
        tracing::info!(engine = self.recognizer.name(), "OCR engine released");
        true
    }
}

impl std::fmt::Debug for OcrEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrEngineHandle")
            .field("engine", &self.recognizer.name())
            .field("availability", &self.availability.get())
            .field("released", &self.is_released())
            .finish()
    }
}
