//! Text detection: run the ordered recognition strategies over the region,
//! keep the best-scoring pass, group its words into phrases and turn each
//! phrase into a [`DetectedElement`].

pub mod engine;
pub mod keywords;
pub mod preprocess;
pub mod strategy;
pub mod tesseract;

use std::sync::Arc;

use async_trait::async_trait;
use image::GrayImage;

use crate::errors::{VisionError, VisionResult};
use crate::perception::region::RegionFrame;
use crate::perception::traits::{element_id, Detector};
use crate::perception::types::{BoundingBox, DetectedElement, DetectionMethod, ElementMetadata};
use crate::perception::warn::WarningLog;

use engine::{LineKey, OcrEngineHandle, OcrWord};
use strategy::{score_words, select_best, ScoreWeights, Strategy, StrategyOutcome};

/// Words on one line closer than `factor × height` are joined.
pub const DEFAULT_JOIN_GAP_FACTOR: f32 = 1.5;
pub const DEFAULT_EARLY_EXIT: f32 = 0.7;

/// Adjacent words on one OCR line, in working-image space.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Mean word confidence, 0–100.
    pub confidence: f32,
    pub line: LineKey,
}

/// Join same-line words whose horizontal gap is below
/// `gap_factor ×` their mean height.
pub fn group_phrases(words: &[OcrWord], gap_factor: f32) -> Vec<Phrase> {
    let mut sorted: Vec<&OcrWord> = words.iter().collect();
    sorted.sort_by_key(|w| (w.line, w.x, w.y));

    let mut phrases: Vec<Phrase> = Vec::new();
    let mut members: Vec<&OcrWord> = Vec::new();

    for word in sorted {
        if let Some(prev) = members.last() {
            let gap = word.x as f32 - prev.right() as f32;
            let height = (prev.height + word.height) as f32 / 2.0;
            if prev.line != word.line || gap >= gap_factor * height {
                phrases.push(build_phrase(&members));
                members.clear();
            }
        }
        members.push(word);
    }
    if !members.is_empty() {
        phrases.push(build_phrase(&members));
    }
    phrases
}

fn build_phrase(members: &[&OcrWord]) -> Phrase {
    let x1 = members.iter().map(|w| w.x).min().unwrap_or(0);
    let y1 = members.iter().map(|w| w.y).min().unwrap_or(0);
    let x2 = members.iter().map(|w| w.right()).max().unwrap_or(0);
    let y2 = members.iter().map(|w| w.y + w.height).max().unwrap_or(0);
    let text = members.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    let confidence = members.iter().map(|w| w.confidence).sum::<f32>() / members.len().max(1) as f32;
    Phrase {
        text,
        x: x1,
        y: y1,
        width: x2.saturating_sub(x1),
        height: y2.saturating_sub(y1),
        confidence,
        line: members.first().map(|w| w.line).unwrap_or_default(),
    }
}

pub struct TextDetector {
    engine: Arc<OcrEngineHandle>,
    strategies: Vec<Strategy>,
    weights: ScoreWeights,
    early_exit: f32,
    join_gap_factor: f32,
    warnings: Arc<WarningLog>,
}

impl TextDetector {
    pub fn new(engine: Arc<OcrEngineHandle>) -> Self {
        Self {
            engine,
            strategies: strategy::default_strategies(),
            weights: ScoreWeights::default(),
            early_exit: DEFAULT_EARLY_EXIT,
            join_gap_factor: DEFAULT_JOIN_GAP_FACTOR,
            warnings: Arc::new(WarningLog::new()),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_scoring(mut self, weights: ScoreWeights, early_exit: f32) -> Self {
        self.weights = weights;
        self.early_exit = early_exit;
        self
    }

    pub fn with_join_gap_factor(mut self, factor: f32) -> Self {
        self.join_gap_factor = factor;
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<WarningLog>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn engine(&self) -> &Arc<OcrEngineHandle> {
        &self.engine
    }

    /// Evaluate strategies in order until one scores at or above the
    /// early-exit threshold. Only attempts that produced words are returned.
    pub async fn run_strategies(&self, gray: Arc<GrayImage>) -> Vec<StrategyOutcome> {
        let mut outcomes = Vec::new();

        for (index, strat) in self.strategies.iter().enumerate() {
            let words = match self.attempt(gray.clone(), strat).await {
                Ok(words) => words,
                Err(e) => {
                    self.warnings.warn("ocr", &e.to_string());
                    continue;
                }
            };

            let kept: Vec<OcrWord> = words
                .into_iter()
                .filter(|w| w.confidence >= strat.min_confidence)
                .collect();
            if kept.is_empty() {
                tracing::debug!(strategy = %strat.name, "no words above minimum confidence");
                continue;
            }

            let score = score_words(&kept, &self.weights);
            tracing::debug!(strategy = %strat.name, words = kept.len(), score, "OCR strategy scored");
            outcomes.push(StrategyOutcome {
                index,
                strategy: strat.name.clone(),
                scale: strat.scale,
                words: kept,
                score,
            });

            if score >= self.early_exit {
                tracing::debug!(strategy = %strat.name, score, "early exit");
                break;
            }
        }
        outcomes
    }

    async fn attempt(&self, gray: Arc<GrayImage>, strat: &Strategy) -> VisionResult<Vec<OcrWord>> {
        let transform = strat.preprocess.clone();
        let scale = strat.scale;
        let processed = tokio::task::spawn_blocking(move || preprocess::apply(&gray, &transform, scale))
            .await
            .map_err(|e| VisionError::Strategy {
                name: strat.name.clone(),
                reason: format!("join: {e}"),
            })?
            .map_err(|e| VisionError::Strategy {
                name: strat.name.clone(),
                reason: e.to_string(),
            })?;

        self.engine
            .recognize(&processed, &strat.params)
            .await
            .map_err(|e| VisionError::Strategy {
                name: strat.name.clone(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Detector for TextDetector {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Ocr
    }

    async fn is_available(&self) -> bool {
        self.engine.is_available().await
    }

    async fn detect(&self, frame: &RegionFrame) -> VisionResult<Vec<DetectedElement>> {
        let gray = Arc::new(frame.luma());
        let outcomes = self.run_strategies(gray).await;
        let Some(best) = select_best(&outcomes) else {
            tracing::debug!("no OCR strategy produced usable words");
            return Ok(Vec::new());
        };

        let phrases = group_phrases(&best.words, self.join_gap_factor);
        let mut elements = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            let Some(bbox) = frame.to_full_box(
                phrase.x as f32,
                phrase.y as f32,
                phrase.width as f32,
                phrase.height as f32,
                best.scale,
                best.scale,
            ) else {
                continue;
            };
            elements.push(phrase_element(elements.len(), &phrase, bbox, &best.strategy));
        }

        tracing::debug!(
            strategy = %best.strategy,
            score = best.score,
            elements = elements.len(),
            "OCR detection complete"
        );
        Ok(elements)
    }
}

fn phrase_element(index: usize, phrase: &Phrase, bbox: BoundingBox, strategy: &str) -> DetectedElement {
    let element_type = keywords::classify_text(&phrase.text, &bbox);
    let mut metadata = ElementMetadata::new(DetectionMethod::Ocr);
    metadata.ocr_confidence = Some(phrase.confidence);
    metadata.ocr_strategy = Some(strategy.to_string());
    metadata.aspect_ratio = Some(bbox.aspect_ratio());

    DetectedElement::new(
        element_id(DetectionMethod::Ocr, index),
        element_type,
        bbox,
        phrase.confidence / 100.0,
        metadata,
    )
    .with_text(phrase.text.clone())
    .with_description(format!("{} \"{}\"", element_type.as_str(), phrase.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::ocr::engine::{OcrParams, TextRecognizer};
    use crate::perception::ocr::strategy::Preprocess;
    use crate::perception::types::ElementType;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn word(text: &str, x: u32, line: u32, confidence: f32) -> OcrWord {
        OcrWord {
            text: text.into(),
            confidence,
            x,
            y: 20,
            width: 40,
            height: 20,
            line: LineKey {
                block: 1,
                paragraph: 1,
                line,
            },
        }
    }

    /// Replies from a script, one entry per call; records the PSM used.
    struct Scripted {
        replies: Mutex<Vec<VisionResult<Vec<OcrWord>>>>,
        calls: AtomicUsize,
        psms: Mutex<Vec<u8>>,
    }

    impl Scripted {
        fn new(replies: Vec<VisionResult<Vec<OcrWord>>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                psms: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextRecognizer for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn probe(&self) -> VisionResult<String> {
            Ok("test".into())
        }

        async fn recognize(&self, _image: &GrayImage, params: &OcrParams) -> VisionResult<Vec<OcrWord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.psms.lock().unwrap().push(params.page_seg_mode);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(vec![])
            } else {
                replies.remove(0)
            }
        }
    }

    fn frame(w: u32, h: u32) -> RegionFrame {
        RegionFrame::from_image(DynamicImage::new_luma8(w, h), None).unwrap()
    }

    #[test]
    fn groups_close_words_on_same_line() {
        let words = vec![
            word("Sign", 10, 1, 90.0),
            word("in", 60, 1, 80.0),
            word("Help", 300, 1, 70.0),
            word("Next", 10, 2, 95.0),
        ];
        let phrases = group_phrases(&words, 1.5);
        let texts: Vec<&str> = phrases.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Sign in", "Help", "Next"]);
        assert_eq!((phrases[0].x, phrases[0].width), (10, 90));
        assert!((phrases[0].confidence - 85.0).abs() < 1e-4);
    }

    #[test]
    fn gap_at_threshold_splits() {
        // gap = 30 = 1.5 × 20
        let words = vec![word("A", 0, 1, 90.0), word("B", 70, 1, 90.0)];
        assert_eq!(group_phrases(&words, 1.5).len(), 2);
    }

    #[tokio::test]
    async fn early_exit_stops_the_loop() {
        let many: Vec<OcrWord> = (0..10).map(|i| word(&format!("w{i}"), i * 100, 1, 95.0)).collect();
        let rec = Scripted::new(vec![Ok(many)]);
        let engine = Arc::new(OcrEngineHandle::new(rec.clone()));
        let detector = TextDetector::new(engine);

        let outcomes = detector.run_strategies(Arc::new(GrayImage::new(50, 50))).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_and_low_confidence_fall_through() {
        let rec = Scripted::new(vec![
            Err(VisionError::Recognition("boom".into())),
            Ok(vec![word("noise", 0, 1, 10.0)]),
            Ok(vec![word("Submit", 0, 1, 60.0)]),
        ]);
        let engine = Arc::new(OcrEngineHandle::new(rec.clone()));
        let detector = TextDetector::new(engine);

        let outcomes = detector.run_strategies(Arc::new(GrayImage::new(50, 50))).await;
        assert_eq!(rec.calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].strategy, "edge_sharpen");
        assert_eq!(*rec.psms.lock().unwrap(), vec![11, 6, 11, 11, 3]);
    }

    #[tokio::test]
    async fn detect_maps_back_to_full_coordinates() {
        let rec = Scripted::new(vec![Ok(vec![OcrWord {
            text: "Submit".into(),
            confidence: 90.0,
            x: 30,
            y: 15,
            width: 60,
            height: 30,
            line: LineKey::default(),
        }])]);
        let engine = Arc::new(OcrEngineHandle::new(rec));
        let detector = TextDetector::new(engine).with_strategies(vec![Strategy::new(
            "scaled",
            Preprocess::None,
            1.5,
            11,
            50.0,
        )]);

        let img = DynamicImage::new_luma8(400, 300);
        let region = BoundingBox::new(100, 50, 200, 120);
        let frame = RegionFrame::from_image(img, Some(&region)).unwrap();
        let elements = detector.detect(&frame).await.unwrap();

        assert_eq!(elements.len(), 1);
        let el = &elements[0];
        assert_eq!(el.coordinates, BoundingBox::new(120, 60, 40, 20));
        assert_eq!(el.element_type, ElementType::Button);
        assert_eq!(el.id, "ocr_1");
        assert!((el.confidence - 0.9).abs() < 1e-5);
        assert_eq!(el.metadata.ocr_strategy.as_deref(), Some("scaled"));
    }

    #[tokio::test]
    async fn nothing_usable_yields_empty() {
        let rec = Scripted::new(vec![]);
        let detector = TextDetector::new(Arc::new(OcrEngineHandle::new(rec)));
        assert!(detector.detect(&frame(40, 40)).await.unwrap().is_empty());
    }
}
