/// Detection pipeline: decode and crop the screenshot, run the enabled
/// detectors concurrently, then fuse their output into one ranked list.
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::{AbortHandle, JoinSet};

use crate::config::VisionConfig;
use crate::errors::{VisionError, VisionResult};
use crate::perception::click;
use crate::perception::fusion::{self, FusionSettings};
use crate::perception::ocr::engine::OcrEngineHandle;
use crate::perception::ocr::tesseract::TesseractCli;
use crate::perception::ocr::TextDetector;
use crate::perception::region::RegionFrame;
use crate::perception::remote::{RemoteSemanticDetector, RemoteSettings};
use crate::perception::search::{self, SearchSettings};
use crate::perception::semantic::{self, SemanticSettings};
use crate::perception::shape::ShapeDetector;
use crate::perception::template::{TemplateDetector, TemplateLibrary};
use crate::perception::traits::Detector;
use crate::perception::types::{
    BoundingBox, ClickTarget, DetectedElement, DetectionConfig, DetectionMethod, DetectionReport, DetectorRun,
    DetectorStatus, UniversalUIElement,
};
use crate::perception::warn::WarningLog;

// Slot order fixes the order of the candidate pool, and with it the fused
// output for equal inputs.
const OCR: usize = 0;
const TEMPLATE: usize = 1;
const REMOTE: usize = 2;
const EDGE: usize = 3;
const SLOTS: [(&str, DetectionMethod); 4] = [
    ("ocr", DetectionMethod::Ocr),
    ("template", DetectionMethod::Template),
    ("remote", DetectionMethod::RemoteSemantic),
    ("edge", DetectionMethod::Edge),
];

/// Availability of one detector, as reported by [`ElementDetector::probe`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorProbe {
    pub detector: String,
    pub method: DetectionMethod,
    pub configured: bool,
    pub available: bool,
}

enum Outcome {
    Unavailable,
    Finished(VisionResult<Vec<DetectedElement>>),
}

/// Multi-detector UI element detector.
///
/// Holds the reusable resources (OCR engine handle, template library, HTTP
/// client) for the lifetime of the process. Every call is independent.
pub struct ElementDetector {
    detectors: [Option<Arc<dyn Detector>>; 4],
    engine: Option<Arc<OcrEngineHandle>>,
    defaults: DetectionConfig,
    remote_settings: RemoteSettings,
    fusion: FusionSettings,
    semantic: SemanticSettings,
    search: SearchSettings,
    warnings: Arc<WarningLog>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for ElementDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.detectors.iter().flatten().map(|d| d.name()).collect();
        f.debug_struct("ElementDetector")
            .field("detectors", &names)
            .field("engine", &self.engine)
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}

impl ElementDetector {
    /// Build the production detector set from `config`: the `tesseract`
    /// CLI for text, edge shapes, templates from `template.directory` and
    /// the remote semantic service.
    pub fn new(config: &VisionConfig) -> VisionResult<Self> {
        config.validate()?;
        let warnings = Arc::new(WarningLog::new());

        let recognizer = Arc::new(TesseractCli::new(config.ocr.tesseract.clone()));
        let engine = Arc::new(OcrEngineHandle::with_warnings(recognizer, warnings.clone()));
        let text = TextDetector::new(engine.clone())
            .with_strategies(config.ocr.strategies.clone())
            .with_scoring(config.ocr.scoring, config.ocr.early_exit)
            .with_join_gap_factor(config.ocr.join_gap_factor)
            .with_warnings(warnings.clone());

        let library = match &config.template.directory {
            Some(dir) => TemplateLibrary::load_dir(dir).unwrap_or_else(|e| {
                warnings.warn("template", &e.to_string());
                TemplateLibrary::new()
            }),
            None => TemplateLibrary::new(),
        };
        let template = TemplateDetector::new(library).with_threshold(config.template.match_threshold);

        Ok(Self::builder()
            .warnings(warnings)
            .ocr_engine(engine)
            .ocr(Arc::new(text))
            .template(Arc::new(template))
            .remote(Arc::new(RemoteSemanticDetector::new(config.remote.clone())))
            .shape(Arc::new(ShapeDetector::new(config.shape.clone())))
            .defaults(config.detection.clone())
            .remote_settings(config.remote.clone())
            .fusion(config.fusion.clone())
            .semantic(config.semantic.clone())
            .search(config.search.clone())
            .build())
    }

    pub fn builder() -> ElementDetectorBuilder {
        ElementDetectorBuilder::default()
    }

    /// Detection switches from the loaded configuration.
    pub fn defaults(&self) -> &DetectionConfig {
        &self.defaults
    }

    pub fn warnings(&self) -> &Arc<WarningLog> {
        &self.warnings
    }

    /// Fused elements for `screenshot`. Never fails: any error yields an
    /// empty list and a warning.
    pub async fn detect(&self, screenshot: &[u8], config: &DetectionConfig) -> Vec<DetectedElement> {
        self.detect_with_report(screenshot, config).await.elements
    }

    /// Like [`detect`](Self::detect) with per-detector provenance.
    pub async fn detect_with_report(&self, screenshot: &[u8], config: &DetectionConfig) -> DetectionReport {
        match self.run(screenshot, config).await {
            Ok(report) => report,
            Err(e) => {
                self.warnings.warn("detect", &e.to_string());
                DetectionReport::empty()
            }
        }
    }

    /// Run a detection that gives up as soon as `cancel` completes. In-flight
    /// detector tasks are aborted and the call returns
    /// [`VisionError::Cancelled`].
    pub async fn detect_until<F>(
        &self,
        screenshot: &[u8],
        config: &DetectionConfig,
        cancel: F,
    ) -> VisionResult<DetectionReport>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!("detection cancelled");
                Err(VisionError::Cancelled)
            }
            r = self.run(screenshot, config) => r,
        }
    }

    async fn run(&self, screenshot: &[u8], config: &DetectionConfig) -> VisionResult<DetectionReport> {
        let started = Instant::now();
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(VisionError::EngineUnavailable("element detector has been shut down".into()));
        }
        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            return Err(VisionError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                config.confidence_threshold
            )));
        }

        let bytes = screenshot.to_vec();
        let region = config.search_region;
        let frame = tokio::task::spawn_blocking(move || RegionFrame::extract(&bytes, region.as_ref()))
            .await
            .map_err(|e| VisionError::Decode(format!("join: {e}")))??;
        let frame = Arc::new(frame);

        let enabled = [
            config.enable_ocr,
            config.enable_template,
            config.enable_remote,
            config.enable_shape,
        ];
        let mut runs: [Option<DetectorRun>; 4] = Default::default();
        let mut results: [Vec<DetectedElement>; 4] = Default::default();
        let mut set = JoinSet::new();
        let mut ocr_abort: Option<AbortHandle> = None;

        for (slot, detector) in self.detectors.iter().enumerate() {
            if !enabled[slot] {
                runs[slot] = Some(run_record(slot, DetectorStatus::Disabled, 0));
                continue;
            }
            let Some(detector) = detector.clone() else {
                runs[slot] = Some(run_record(slot, DetectorStatus::Unavailable, 0));
                continue;
            };
            let frame = frame.clone();
            let handle = set.spawn(async move {
                let t = Instant::now();
                let outcome = if detector.is_available().await {
                    Outcome::Finished(detector.detect(&frame).await)
                } else {
                    Outcome::Unavailable
                };
                (slot, outcome, t.elapsed().as_millis() as u64)
            });
            if slot == OCR {
                ocr_abort = Some(handle);
            }
        }

        while let Some(joined) = set.join_next().await {
            let (slot, outcome, elapsed_ms) = match joined {
                Ok(v) => v,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    self.warnings.warn("detect", &format!("detector task failed: {e}"));
                    continue;
                }
            };
            // A late OCR result after the remote service superseded it.
            if runs[slot].is_some() {
                continue;
            }
            let name = SLOTS[slot].0;
            let status = match outcome {
                Outcome::Unavailable => {
                    self.warnings.warn(name, "detector unavailable, skipped");
                    DetectorStatus::Unavailable
                }
                Outcome::Finished(Err(e)) => {
                    self.warnings.warn(name, &e.to_string());
                    DetectorStatus::Failed { message: e.to_string() }
                }
                Outcome::Finished(Ok(elements)) => {
                    tracing::debug!(detector = name, count = elements.len(), elapsed_ms, "detector finished");
                    if slot == REMOTE && runs[OCR].is_none() && self.remote_settings.supersedes_ocr(&elements) {
                        if let Some(handle) = ocr_abort.take() {
                            handle.abort();
                            tracing::info!(remote = elements.len(), "remote result supersedes OCR, aborting");
                            runs[OCR] = Some(run_record(
                                OCR,
                                DetectorStatus::Skipped {
                                    reason: "superseded by remote semantic result".into(),
                                },
                                0,
                            ));
                        }
                    }
                    let count = elements.len();
                    results[slot] = elements;
                    DetectorStatus::Used { count }
                }
            };
            runs[slot] = Some(run_record(slot, status, elapsed_ms));
        }

        let detectors: Vec<DetectorRun> = runs
            .into_iter()
            .enumerate()
            .map(|(slot, run)| {
                run.unwrap_or_else(|| {
                    run_record(
                        slot,
                        DetectorStatus::Failed {
                            message: "detector task panicked".into(),
                        },
                        0,
                    )
                })
            })
            .collect();

        let pool: Vec<DetectedElement> = results.into_iter().flatten().collect();
        let elements = fusion::fuse(pool, config.confidence_threshold, &self.fusion);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            elements = elements.len(),
            width = frame.width(),
            height = frame.height(),
            offset_x = frame.offset_x,
            offset_y = frame.offset_y,
            elapsed_ms,
            "detection complete"
        );

        Ok(DetectionReport {
            elements,
            detectors,
            image_width: frame.full_width,
            image_height: frame.full_height,
            offset: (frame.offset_x, frame.offset_y),
            region: frame.bounds(),
            elapsed_ms,
        })
    }

    /// Project into the universal vocabulary without a known viewport, so
    /// menu words are not held to the upper quarter.
    pub fn project(&self, elements: &[DetectedElement]) -> Vec<UniversalUIElement> {
        semantic::project(elements, &self.semantic)
    }

    /// Project a report's elements against the area it searched.
    pub fn project_report(&self, report: &DetectionReport) -> Vec<UniversalUIElement> {
        semantic::project_within(&report.elements, &report.region, &self.semantic)
    }

    pub fn project_within(&self, elements: &[DetectedElement], viewport: &BoundingBox) -> Vec<UniversalUIElement> {
        semantic::project_within(elements, viewport, &self.semantic)
    }

    pub fn resolve_click_target(&self, element: &DetectedElement) -> ClickTarget {
        click::resolve_click_target(element)
    }

    pub fn find_by_description<'a>(
        &self,
        elements: &'a [DetectedElement],
        description: &str,
    ) -> Option<&'a DetectedElement> {
        search::find_by_description(elements, description, &self.search)
    }

    /// Availability of every detector slot, checked now.
    pub async fn probe(&self) -> Vec<DetectorProbe> {
        let mut probes = Vec::with_capacity(SLOTS.len());
        for (slot, detector) in self.detectors.iter().enumerate() {
            let (name, method) = SLOTS[slot];
            let available = match detector {
                Some(d) => d.is_available().await,
                None => false,
            };
            probes.push(DetectorProbe {
                detector: name.to_string(),
                method,
                configured: detector.is_some(),
                available,
            });
        }
        probes
    }

    /// Release the OCR engine. Returns `false` when already shut down.
    /// Subsequent detections return nothing.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(engine) = &self.engine {
            engine.shutdown().await;
        }
        tracing::info!("element detector shut down");
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

fn run_record(slot: usize, status: DetectorStatus, elapsed_ms: u64) -> DetectorRun {
    let (name, method) = SLOTS[slot];
    DetectorRun {
        detector: name.to_string(),
        method,
        status,
        elapsed_ms,
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Assembles an [`ElementDetector`] from arbitrary detectors. Slots left
/// empty report `unavailable` when enabled.
#[derive(Default)]
pub struct ElementDetectorBuilder {
    detectors: [Option<Arc<dyn Detector>>; 4],
    engine: Option<Arc<OcrEngineHandle>>,
    defaults: DetectionConfig,
    remote_settings: RemoteSettings,
    fusion: FusionSettings,
    semantic: SemanticSettings,
    search: SearchSettings,
    warnings: Option<Arc<WarningLog>>,
}

impl ElementDetectorBuilder {
    pub fn ocr(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors[OCR] = Some(detector);
        self
    }

    /// Engine released by [`ElementDetector::shutdown`].
    pub fn ocr_engine(mut self, engine: Arc<OcrEngineHandle>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn template(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors[TEMPLATE] = Some(detector);
        self
    }

    pub fn remote(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors[REMOTE] = Some(detector);
        self
    }

    pub fn shape(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors[EDGE] = Some(detector);
        self
    }

    pub fn defaults(mut self, defaults: DetectionConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn remote_settings(mut self, settings: RemoteSettings) -> Self {
        self.remote_settings = settings;
        self
    }

    pub fn fusion(mut self, settings: FusionSettings) -> Self {
        self.fusion = settings;
        self
    }

    pub fn semantic(mut self, settings: SemanticSettings) -> Self {
        self.semantic = settings;
        self
    }

    pub fn search(mut self, settings: SearchSettings) -> Self {
        self.search = settings;
        self
    }

    pub fn warnings(mut self, warnings: Arc<WarningLog>) -> Self {
        self.warnings = Some(warnings);
        self
    }

    pub fn build(self) -> ElementDetector {
        ElementDetector {
            detectors: self.detectors,
            engine: self.engine,
            defaults: self.defaults,
            remote_settings: self.remote_settings,
            fusion: self.fusion,
            semantic: self.semantic,
            search: self.search,
            warnings: self.warnings.unwrap_or_default(),
            shut_down: AtomicBool::new(false),
        }
    }
}
