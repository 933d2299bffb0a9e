/// Find the element best matching a free-text description such as
/// "submit button" or "email field".
use serde::{Deserialize, Serialize};

use crate::perception::ocr::keywords::tokens;
use crate::perception::types::{DetectedElement, ElementType};

const EXACT_SCORE: f32 = 1.0;
const SUBSTRING_SCORE: f32 = 0.85;
const MIN_SUBSTRING_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &["the", "a", "an", "on", "to", "of"];

/// Words in a query that name an element type.
const TYPE_WORDS: &[(&str, ElementType)] = &[
    ("button", ElementType::Button),
    ("btn", ElementType::Button),
    ("input", ElementType::Input),
    ("field", ElementType::Input),
    ("textbox", ElementType::Input),
    ("box", ElementType::Input),
    ("link", ElementType::Link),
    ("icon", ElementType::Icon),
    ("dropdown", ElementType::Dropdown),
    ("select", ElementType::Dropdown),
    ("checkbox", ElementType::Checkbox),
    ("label", ElementType::Text),
    ("text", ElementType::Text),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Matches at or below this score are rejected.
    pub min_score: f32,
    pub type_bonus: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_score: 0.6,
            type_bonus: 0.2,
        }
    }
}

/// Best-scoring element for `description`, or `None` when nothing scores
/// above `settings.min_score`. Ties keep the earlier element.
pub fn find_by_description<'a>(
    elements: &'a [DetectedElement],
    description: &str,
    settings: &SearchSettings,
) -> Option<&'a DetectedElement> {
    let query = Query::parse(description)?;
    let mut best: Option<(&DetectedElement, f32)> = None;
    for element in elements {
        let score = query.score(element, settings);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((element, score));
        }
    }
    let (element, score) = best?;
    tracing::debug!(query = %description, id = %element.id, score, "description search");
    (score > settings.min_score).then_some(element)
}

struct Query {
    /// Normalized words with type and stop words removed (all words when
    /// that would leave nothing).
    text: String,
    words: Vec<String>,
    types: Vec<ElementType>,
}

impl Query {
    fn parse(description: &str) -> Option<Self> {
        let lower = description.to_lowercase();
        let all: Vec<&str> = tokens(&lower);
        if all.is_empty() {
            return None;
        }
        let types: Vec<ElementType> = all
            .iter()
            .filter_map(|w| TYPE_WORDS.iter().find(|(k, _)| k == w).map(|(_, t)| *t))
            .collect();
        let content: Vec<&str> = all
            .iter()
            .copied()
            .filter(|w| !STOP_WORDS.contains(w) && !TYPE_WORDS.iter().any(|(k, _)| k == w))
            .collect();
        let source = if content.is_empty() { &all } else { &content };
        let words: Vec<String> = source
            .iter()
            .map(|w| w.to_string())
            .collect();
        Some(Self {
            text: words.join(" "),
            words,
            types,
        })
    }

    fn score(&self, element: &DetectedElement, settings: &SearchSettings) -> f32 {
        let source = element.text.as_deref().unwrap_or(element.description.as_str());
        let mut score = text_score(&self.text, &self.words, source);
        if self.types.contains(&element.element_type) {
            score += settings.type_bonus;
        }
        score * (0.7 + 0.3 * element.confidence)
    }
}

/// Exact 1.0, substring either way 0.85, else the better of token Jaccard
/// and normalized edit similarity.
fn text_score(query: &str, query_words: &[String], candidate: &str) -> f32 {
    let lower = candidate.to_lowercase();
    let cand_words = tokens(&lower);
    if cand_words.is_empty() {
        return 0.0;
    }
    let cand = cand_words.join(" ");
    if cand == query {
        return EXACT_SCORE;
    }
    // Very short fragments would match almost any query.
    let long_enough = |s: &str| s.chars().count() >= MIN_SUBSTRING_CHARS;
    if (long_enough(query) && cand.contains(query)) || (long_enough(&cand) && query.contains(cand.as_str())) {
        return SUBSTRING_SCORE;
    }

    let inter = query_words.iter().filter(|w| cand_words.contains(&w.as_str())).count();
    let union = query_words.len() + cand_words.len() - inter;
    let jaccard = if union == 0 { 0.0 } else { inter as f32 / union as f32 };
    jaccard.max(edit_similarity(query, &cand))
}

/// `1 - levenshtein / max_len` over chars.
pub fn edit_similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    1.0 - prev[b.len()] as f32 / max_len as f32
}
