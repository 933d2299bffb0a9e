/// Literal keyword classification of recognized text.
use crate::perception::types::{BoundingBox, ElementType};

const LINK_MARKERS: &[&str] = &["http", "www", ".com", ".org", ".net", ".io"];

pub const BUTTON_WORDS: &[&str] = &[
    "install", "save", "submit", "login", "log in", "sign in", "sign up", "signup", "register",
    "cancel", "ok", "apply", "continue", "next", "back", "close", "delete", "remove", "confirm",
    "send", "open", "download", "upload", "update", "add", "create", "done", "finish", "accept",
    "decline", "retry", "yes", "no", "start", "skip", "allow", "deny",
];

const PLACEHOLDER_PREFIXES: &[&str] = &["enter ", "type ", "search for", "e.g.", "your "];

/// Button labels longer than this many words are treated as prose.
const MAX_BUTTON_WORDS: usize = 4;

/// Classify a phrase by its text and box shape:
/// link markers, then placeholder phrasing, then action words, then short
/// wide boxes (input), else plain text.
pub fn classify_text(text: &str, bbox: &BoundingBox) -> ElementType {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return ElementType::Unknown;
    }

    if LINK_MARKERS.iter().any(|m| lower.contains(m)) {
        return ElementType::Link;
    }

    if is_placeholder(&lower) {
        return ElementType::Input;
    }

    let words = tokens(&lower);
    if words.len() <= MAX_BUTTON_WORDS && contains_action_word(&lower, &words) {
        return ElementType::Button;
    }

    let visible_chars = lower.chars().filter(|c| !c.is_whitespace()).count();
    if visible_chars <= 2 && bbox.aspect_ratio() >= 3.0 {
        return ElementType::Input;
    }

    ElementType::Text
}

fn is_placeholder(lower: &str) -> bool {
    PLACEHOLDER_PREFIXES.iter().any(|p| lower.starts_with(p))
        || lower.ends_with("...")
        || lower.ends_with('…')
        || lower.contains("type here")
}

fn contains_action_word(lower: &str, words: &[&str]) -> bool {
    BUTTON_WORDS.iter().any(|kw| {
        if kw.contains(' ') {
            lower.contains(kw)
        } else {
            words.iter().any(|w| w == kw)
        }
    })
}

/// Lower-case alphanumeric tokens.
pub fn tokens(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}
