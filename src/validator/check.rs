//! Individual driving-mode rules

use serde::{Deserialize, Serialize};

use super::policy::CharRange;

/// Rejection category, or the note that a response was cleaned up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    TooLong,
    ContainsQuestion,
    ContainsAffectionateTerm,
    ContainsNarrativeMarker,
    ContainsEmoji,
    /// The response failed but a cleaned version passed
    Sanitized,
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationReason::TooLong => write!(f, "too_long"),
            ValidationReason::ContainsQuestion => write!(f, "contains_question"),
            ValidationReason::ContainsAffectionateTerm => write!(f, "contains_affectionate_term"),
            ValidationReason::ContainsNarrativeMarker => write!(f, "contains_narrative_marker"),
            ValidationReason::ContainsEmoji => write!(f, "contains_emoji"),
            ValidationReason::Sanitized => write!(f, "sanitized"),
        }
    }
}

/// One failed rule, with what tripped it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    TooLong { length: usize, max_len: usize },
    ContainsQuestion,
    ContainsAffectionateTerm { term: String },
    ContainsNarrativeMarker { marker: String },
    ContainsEmoji { found: String },
}

impl Violation {
    pub fn reason(&self) -> ValidationReason {
        match self {
            Violation::TooLong { .. } => ValidationReason::TooLong,
            Violation::ContainsQuestion => ValidationReason::ContainsQuestion,
            Violation::ContainsAffectionateTerm { .. } => ValidationReason::ContainsAffectionateTerm,
            Violation::ContainsNarrativeMarker { .. } => ValidationReason::ContainsNarrativeMarker,
            Violation::ContainsEmoji { .. } => ValidationReason::ContainsEmoji,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::TooLong { length, max_len } => {
                write!(f, "exceeds max length ({} > {})", length, max_len)
            }
            Violation::ContainsQuestion => write!(f, "contains question"),
            Violation::ContainsAffectionateTerm { term } => {
                write!(f, "contains affectionate term: {}", term)
            }
            Violation::ContainsNarrativeMarker { marker } => {
                write!(f, "contains narrative marker: {}", marker)
            }
            Violation::ContainsEmoji { found } => write!(f, "contains emoji/emoticon: {}", found),
        }
    }
}

/// Characters that may trail a sentence terminator ("Really?" she said)
pub(crate) fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '»' | '\u{201D}' | '\u{2019}')
}

pub(crate) fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// True when some sentence ends in `?`
pub(crate) fn has_question(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '?' {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if is_terminator(next) || is_closing(next) {
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek() {
            None => return true,
            Some(next) if next.is_whitespace() => return true,
            _ => {}
        }
    }
    false
}

/// First term (already lower-cased) found in `lowered`
pub(crate) fn find_term<'a>(lowered: &str, terms: &'a [String]) -> Option<&'a str> {
    terms
        .iter()
        .map(String::as_str)
        .find(|term| lowered.contains(term))
}

pub(crate) fn is_emoji(c: char, ranges: &[CharRange]) -> bool {
    ranges.iter().any(|range| range.contains(c))
}

/// An emoticon only counts when not glued to a following word (`:P0420`)
pub(crate) fn emoticon_ends_here(rest: &str) -> bool {
    !rest.chars().next().is_some_and(char::is_alphanumeric)
}

/// First emoji character or standalone emoticon in `text`
pub(crate) fn find_emoji(text: &str, ranges: &[CharRange], emoticons: &[String]) -> Option<String> {
    if let Some(c) = text.chars().find(|&c| is_emoji(c, ranges)) {
        return Some(c.to_string());
    }
    emoticons
        .iter()
        .filter(|emoticon| !emoticon.is_empty())
        .find(|emoticon| {
            text.match_indices(emoticon.as_str())
                .any(|(idx, m)| emoticon_ends_here(&text[idx + m.len()..]))
        })
        .cloned()
}
