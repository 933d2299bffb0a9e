/// Ordered recognition strategies and their scoring.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::perception::ocr::engine::{OcrParams, OcrWord};

/// Image transform applied before recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preprocess {
    None,
    Clahe { clip_limit: f32, tiles: u32 },
    Median { radius: u32 },
    Sharpen,
    AdaptiveThreshold { block_radius: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub preprocess: Preprocess,
    /// Working image = region scaled by this factor.
    pub scale: f32,
    pub params: OcrParams,
    /// Words below this confidence (0–100) are discarded.
    pub min_confidence: f32,
}

impl Strategy {
    pub fn new(name: &str, preprocess: Preprocess, scale: f32, psm: u8, min_confidence: f32) -> Self {
        Self {
            name: name.to_string(),
            preprocess,
            scale,
            params: OcrParams::psm(psm),
            min_confidence,
        }
    }
}

pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new(
            "clahe_contrast",
            Preprocess::Clahe {
                clip_limit: 2.0,
                tiles: 8,
            },
            1.5,
            11,
            60.0,
        ),
        Strategy::new("median_denoise", Preprocess::Median { radius: 1 }, 1.8, 6, 55.0),
        Strategy::new("edge_sharpen", Preprocess::Sharpen, 1.2, 11, 50.0),
        Strategy::new(
            "adaptive_binarize",
            Preprocess::AdaptiveThreshold { block_radius: 15 },
            1.5,
            11,
            50.0,
        ),
        Strategy::new("baseline", Preprocess::None, 1.0, 3, 40.0),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub confidence_weight: f32,
    pub unique_text_weight: f32,
    /// Distinct-word count at which the diversity term saturates.
    pub saturation: usize,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            confidence_weight: 0.6,
            unique_text_weight: 0.4,
            saturation: 10,
        }
    }
}

/// `w_c · mean_conf/100 + w_u · min(distinct / saturation, 1)`.
/// Empty input scores 0.
pub fn score_words(words: &[OcrWord], weights: &ScoreWeights) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    let mean = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    let distinct: HashSet<String> = words.iter().map(|w| w.text.to_lowercase()).collect();
    let diversity = (distinct.len() as f32 / weights.saturation.max(1) as f32).min(1.0);
    weights.confidence_weight * (mean / 100.0) + weights.unique_text_weight * diversity
}

/// Result of one strategy attempt that produced usable words.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub index: usize,
    pub strategy: String,
    pub scale: f32,
    pub words: Vec<OcrWord>,
    pub score: f32,
}

/// Highest score wins; ties go to the earliest strategy.
pub fn select_best(outcomes: &[StrategyOutcome]) -> Option<&StrategyOutcome> {
    let mut best: Option<&StrategyOutcome> = None;
    for outcome in outcomes {
        match best {
            Some(b) if outcome.score > b.score || (outcome.score == b.score && outcome.index < b.index) => {
                best = Some(outcome)
            }
            None => best = Some(outcome),
            _ => {}
        }
    }
    best
}
