/// Projection of detected elements into the reduced universal vocabulary
/// (button / text_input / clickable / menu_item) with semantic roles.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::perception::click::resolve_click_target;
use crate::perception::ocr::keywords::tokens;
use crate::perception::types::{
    BoundingBox, DetectedElement, ElementType, SemanticRole, UniversalElementType, UniversalUIElement,
};

const MENU_WORDS: &[&str] = &["file", "edit", "view", "help", "window", "go", "tools", "settings"];

const ACTION_WORDS: &[&str] = &[
    "ok", "close", "cancel", "next", "back", "submit", "install", "continue", "save", "apply", "done",
    "finish", "yes", "no", "accept", "decline", "login", "register", "send", "open", "delete", "remove",
    "retry", "skip", "search", "confirm", "start",
];

/// Ordered: the first pattern that matches decides the role.
static ROLE_PATTERNS: LazyLock<Vec<(SemanticRole, Regex)>> = LazyLock::new(|| {
    [
        (SemanticRole::Submit, r"(?i)\b(submit|send|confirm|ok|apply|done|finish)\b"),
        (SemanticRole::Cancel, r"(?i)\b(cancel|dismiss|close|abort)\b"),
        (SemanticRole::Search, r"(?i)\b(search|find|look\s*up)\b"),
        (SemanticRole::Login, r"(?i)\b(log\s*in|sign\s*in)\b"),
        (SemanticRole::Signup, r"(?i)\b(sign\s*up|register|create\s+(an\s+)?account)\b"),
        (SemanticRole::Next, r"(?i)\b(next|continue|proceed|forward)\b"),
        (SemanticRole::Back, r"(?i)\b(back|previous|prev|return)\b"),
        (SemanticRole::Delete, r"(?i)\b(delete|remove|trash|discard)\b"),
        (SemanticRole::Save, r"(?i)\b(save|store)\b"),
        (SemanticRole::Edit, r"(?i)\b(edit|modify|rename|change)\b"),
    ]
    .into_iter()
    .filter_map(|(role, pattern)| Regex::new(pattern).ok().map(|re| (role, re)))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticSettings {
    /// Elements smaller than this cannot be targeted reliably.
    pub min_width: u32,
    pub min_height: u32,
    pub menu_max_chars: usize,
    pub menu_min_height: u32,
    pub menu_max_height: u32,
    pub action_max_chars: usize,
    pub action_max_words: usize,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            min_width: 18,
            min_height: 14,
            menu_max_chars: 18,
            menu_min_height: 18,
            menu_max_height: 40,
            action_max_chars: 22,
            action_max_words: 3,
        }
    }
}

/// Project without a known viewport; menu words skip the upper-quarter test.
pub fn project(elements: &[DetectedElement], settings: &SemanticSettings) -> Vec<UniversalUIElement> {
    elements
        .iter()
        .filter_map(|e| project_element(e, None, settings))
        .collect()
}

/// Project against `viewport`, the searched region or full screenshot.
pub fn project_within(
    elements: &[DetectedElement],
    viewport: &BoundingBox,
    settings: &SemanticSettings,
) -> Vec<UniversalUIElement> {
    elements
        .iter()
        .filter_map(|e| project_element(e, Some(viewport), settings))
        .collect()
}

/// `None` when the element is too small or not actionable.
pub fn project_element(
    element: &DetectedElement,
    viewport: Option<&BoundingBox>,
    settings: &SemanticSettings,
) -> Option<UniversalUIElement> {
    let b = &element.coordinates;
    if b.width < settings.min_width || b.height < settings.min_height {
        return None;
    }

    let element_type = match element.element_type {
        ElementType::Button => UniversalElementType::Button,
        ElementType::Input => UniversalElementType::TextInput,
        ElementType::Dropdown | ElementType::Link | ElementType::Icon | ElementType::Checkbox => {
            UniversalElementType::Clickable
        }
        ElementType::Text | ElementType::Unknown => {
            let text = element.text.as_deref().map(str::trim).unwrap_or("");
            if is_menu_item(text, b, viewport, settings) {
                UniversalElementType::MenuItem
            } else if is_action_label(text, b, settings) {
                UniversalElementType::Clickable
            } else {
                return None;
            }
        }
    };

    let description = if element.description.is_empty() {
        element.text.clone().unwrap_or_else(|| element.element_type.as_str().to_string())
    } else {
        element.description.clone()
    };

    Some(UniversalUIElement {
        id: element.id.clone(),
        element_type,
        bounds: *b,
        click_point: resolve_click_target(element).coordinates,
        confidence: element.confidence,
        text: element.text.clone(),
        semantic_role: element.text.as_deref().and_then(infer_role),
        description,
    })
}

fn is_menu_item(text: &str, b: &BoundingBox, viewport: Option<&BoundingBox>, s: &SemanticSettings) -> bool {
    if text.is_empty() || text.chars().count() > s.menu_max_chars {
        return false;
    }
    let lower = text.to_lowercase();
    if !MENU_WORDS.contains(&lower.as_str()) {
        return false;
    }
    let upper_quarter = viewport.map_or(true, |v| b.y < v.y + v.height / 4);
    let height_ok = (s.menu_min_height..=s.menu_max_height).contains(&b.height);
    upper_quarter && height_ok && is_title_or_upper(text)
}

fn is_title_or_upper(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let Some(first) = letters.first() else {
        return false;
    };
    let all_upper = letters.iter().all(|c| c.is_uppercase());
    let title = first.is_uppercase() && letters[1..].iter().all(|c| c.is_lowercase());
    all_upper || title
}

fn is_action_label(text: &str, b: &BoundingBox, s: &SemanticSettings) -> bool {
    if text.is_empty() || text.chars().count() > s.action_max_chars {
        return false;
    }
    let lower = text.to_lowercase();
    let words = tokens(&lower);
    if words.is_empty() || words.len() > s.action_max_words {
        return false;
    }
    if !words.iter().any(|w| ACTION_WORDS.contains(w)) {
        return false;
    }
    let aspect = b.aspect_ratio();
    (s.min_height..=120).contains(&b.height) && (0.8..=12.0).contains(&aspect)
}

/// First role pattern matching `text`, if any.
pub fn infer_role(text: &str) -> Option<SemanticRole> {
    ROLE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(role, _)| *role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{DetectionMethod, ElementMetadata};

    fn el(t: ElementType, bbox: BoundingBox, text: Option<&str>) -> DetectedElement {
        let e = DetectedElement::new("ocr_1".into(), t, bbox, 0.8, ElementMetadata::new(DetectionMethod::Ocr));
        match text {
            Some(t) => e.with_text(t),
            None => e,
        }
    }

    fn viewport() -> BoundingBox {
        BoundingBox::new(0, 0, 1280, 800)
    }

    #[test]
    fn tiny_elements_are_dropped() {
        let e = el(ElementType::Button, BoundingBox::new(10, 10, 5, 5), Some("OK"));
        assert!(project(&[e], &SemanticSettings::default()).is_empty());
    }

    #[test]
    fn explicit_types_map_directly() {
        let s = SemanticSettings::default();
        let b = BoundingBox::new(100, 400, 120, 30);
        let cases = [
            (ElementType::Button, UniversalElementType::Button),
            (ElementType::Input, UniversalElementType::TextInput),
            (ElementType::Link, UniversalElementType::Clickable),
            (ElementType::Dropdown, UniversalElementType::Clickable),
            (ElementType::Icon, UniversalElementType::Clickable),
            (ElementType::Checkbox, UniversalElementType::Clickable),
        ];
        for (from, to) in cases {
            let u = project_element(&el(from, b, None), Some(&viewport()), &s).unwrap();
            assert_eq!(u.element_type, to);
        }
    }

    #[test]
    fn menu_words_near_top_become_menu_items() {
        let s = SemanticSettings::default();
        let file = el(ElementType::Text, BoundingBox::new(10, 4, 40, 22), Some("File"));
        let u = project_element(&file, Some(&viewport()), &s).unwrap();
        assert_eq!(u.element_type, UniversalElementType::MenuItem);

        let low = el(ElementType::Text, BoundingBox::new(10, 600, 40, 22), Some("File"));
        assert!(project_element(&low, Some(&viewport()), &s).is_none());

        let lower_case = el(ElementType::Text, BoundingBox::new(10, 4, 40, 22), Some("file"));
        assert!(project_element(&lower_case, Some(&viewport()), &s).is_none());
    }

    #[test]
    fn lone_menu_word_does_not_depend_on_its_neighbours() {
        let s = SemanticSettings::default();
        let file = el(ElementType::Text, BoundingBox::new(10, 10, 40, 22), Some("File"));

        let alone = project(std::slice::from_ref(&file), &s);
        assert_eq!(alone.len(), 1);
        assert_eq!(alone[0].element_type, UniversalElementType::MenuItem);

        let within = project_within(std::slice::from_ref(&file), &viewport(), &s);
        assert_eq!(within[0].element_type, UniversalElementType::MenuItem);

        let footer = el(ElementType::Button, BoundingBox::new(10, 700, 80, 30), Some("Close"));
        let both = project(&[file, footer], &s);
        assert_eq!(both[0].element_type, UniversalElementType::MenuItem);
    }

    #[test]
    fn viewport_offset_moves_the_menu_band() {
        let s = SemanticSettings::default();
        let region = BoundingBox::new(0, 400, 1280, 400);
        let file = el(ElementType::Text, BoundingBox::new(10, 410, 40, 22), Some("File"));
        assert_eq!(
            project_element(&file, Some(&region), &s).map(|u| u.element_type),
            Some(UniversalElementType::MenuItem)
        );
        assert!(project_element(&file, Some(&viewport()), &s).is_none());
    }

    #[test]
    fn action_labels_become_clickable() {
        let s = SemanticSettings::default();
        let e = el(ElementType::Text, BoundingBox::new(500, 500, 90, 28), Some("Continue"));
        let u = project_element(&e, Some(&viewport()), &s).unwrap();
        assert_eq!(u.element_type, UniversalElementType::Clickable);
        assert_eq!(u.semantic_role, Some(SemanticRole::Next));
        assert_eq!(u.click_point.x, 545);

        let prose = el(
            ElementType::Text,
            BoundingBox::new(500, 500, 300, 28),
            Some("Press continue when you are ready"),
        );
        assert!(project_element(&prose, Some(&viewport()), &s).is_none());
    }

    #[test]
    fn plain_text_is_not_actionable() {
        let e = el(ElementType::Text, BoundingBox::new(0, 300, 200, 20), Some("Recent documents"));
        assert!(project_element(&e, Some(&viewport()), &SemanticSettings::default()).is_none());
    }

    #[test]
    fn roles_first_match_wins() {
        assert_eq!(infer_role("Submit"), Some(SemanticRole::Submit));
        assert_eq!(infer_role("Cancel"), Some(SemanticRole::Cancel));
        assert_eq!(infer_role("Search files"), Some(SemanticRole::Search));
        assert_eq!(infer_role("Log in"), Some(SemanticRole::Login));
        assert_eq!(infer_role("Sign up free"), Some(SemanticRole::Signup));
        assert_eq!(infer_role("Go back"), Some(SemanticRole::Back));
        assert_eq!(infer_role("Delete draft"), Some(SemanticRole::Delete));
        assert_eq!(infer_role("Save"), Some(SemanticRole::Save));
        assert_eq!(infer_role("Edit profile"), Some(SemanticRole::Edit));
        // "ok" precedes "cancel" in the pattern order.
        assert_eq!(infer_role("OK / Cancel"), Some(SemanticRole::Submit));
        assert_eq!(infer_role("Welcome"), None);
        assert_eq!(infer_role("Booking"), None);
    }
}
