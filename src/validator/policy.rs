//! Driving-mode response policy
//!
//! Term lists and character ranges are plain data, evaluated in a linear
//! pass by [`super::ResponseValidator`].

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Inclusive range of Unicode code points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CharRange {
    start: u32,
    end: u32,
}

impl CharRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, c: char) -> bool {
        (self.start..=self.end).contains(&(c as u32))
    }
}

impl std::fmt::Display for CharRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "U+{:04X}..U+{:04X}", self.start, self.end)
    }
}

impl From<CharRange> for String {
    fn from(range: CharRange) -> Self {
        range.to_string()
    }
}

/// Accepts `U+1F600..U+1F64F`, `1F600-1F64F` or a single `U+2764`
impl TryFrom<String> for CharRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let invalid = || ConfigError::InvalidCharRange(value.clone());
        let parse = |part: &str| {
            let hex = part.trim();
            let hex = hex
                .strip_prefix("U+")
                .or_else(|| hex.strip_prefix("u+"))
                .unwrap_or(hex);
            u32::from_str_radix(hex, 16).ok()
        };

        let (start, end) = match value.split_once("..").or_else(|| value.split_once('-')) {
            Some((start, end)) => (parse(start), parse(end)),
            None => (parse(&value), parse(&value)),
        };

        match (start, end) {
            (Some(start), Some(end)) if start <= end && end <= 0x10FFFF => Ok(Self { start, end }),
            _ => Err(invalid()),
        }
    }
}

/// Pictographic blocks that never belong in a spoken driving response
pub const DEFAULT_EMOJI_RANGES: &[CharRange] = &[
    CharRange::new(0x1F600, 0x1F64F), // emoticons
    CharRange::new(0x1F300, 0x1F5FF), // symbols & pictographs
    CharRange::new(0x1F680, 0x1F6FF), // transport & map
    CharRange::new(0x1F700, 0x1F77F), // alchemical
    CharRange::new(0x1F780, 0x1F7FF), // geometric shapes extended
    CharRange::new(0x1F800, 0x1F8FF), // supplemental arrows-c
    CharRange::new(0x1F900, 0x1F9FF), // supplemental symbols & pictographs
    CharRange::new(0x1FA00, 0x1FA6F), // chess symbols
    CharRange::new(0x1FA70, 0x1FAFF), // symbols & pictographs extended-a
    CharRange::new(0x2600, 0x27BF),   // misc symbols, dingbats
    CharRange::new(0x1F1E0, 0x1F1FF), // regional indicators
    CharRange::new(0xFE0F, 0xFE0F),   // emoji presentation selector
];

const DEFAULT_AFFECTIONATE_TERMS: &[&str] = &[
    "love", "dear", "honey", "sweetheart", "darling", "babe", "baby", "sweetie", "beloved",
];

const DEFAULT_NARRATIVE_MARKERS: &[&str] = &[
    "you know",
    "actually",
    "basically",
    "honestly",
    "to be honest",
    "fun fact",
    "interestingly",
    "by the way",
    "speaking of",
];

/// `:)`, `;-P` and friends
fn default_emoticons() -> Vec<String> {
    let mut emoticons = Vec::new();
    for eyes in [':', ';'] {
        for nose in ["", "-"] {
            for mouth in ['(', ')', 'D', 'P'] {
                emoticons.push(format!("{eyes}{nose}{mouth}"));
            }
        }
    }
    emoticons
}

/// Constraints applied to responses while DRIVING
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorPolicy {
    /// Maximum response length in characters
    pub max_len: usize,
    pub allow_questions: bool,
    /// Skips the affectionate-term check when set
    pub allow_emotion: bool,
    pub affectionate_terms: Vec<String>,
    pub narrative_markers: Vec<String>,
    pub emoji_ranges: Vec<CharRange>,
    pub emoticons: Vec<String>,
    /// Substituted when a response cannot be made compliant
    pub fallback_phrase: String,
    /// Acknowledgement used when upstream generation failed
    pub error_phrase: String,
}

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            max_len: 150,
            allow_questions: false,
            allow_emotion: false,
            affectionate_terms: DEFAULT_AFFECTIONATE_TERMS.iter().map(|s| s.to_string()).collect(),
            narrative_markers: DEFAULT_NARRATIVE_MARKERS.iter().map(|s| s.to_string()).collect(),
            emoji_ranges: DEFAULT_EMOJI_RANGES.to_vec(),
            emoticons: default_emoticons(),
            fallback_phrase: "Monitoring.".to_string(),
            error_phrase: "Acknowledged.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_range_parsing() {
        let range = CharRange::try_from("U+1F600..U+1F64F".to_string()).unwrap();
        assert_eq!(range, CharRange::new(0x1F600, 0x1F64F));
        assert!(range.contains('😀'));
        assert!(!range.contains('A'));

        let dashed = CharRange::try_from("2600-27BF".to_string()).unwrap();
        assert!(dashed.contains('☀'));

        let single = CharRange::try_from("U+2764".to_string()).unwrap();
        assert!(single.contains('❤'));
    }

    #[test]
    fn test_char_range_rejects_garbage() {
        assert!(CharRange::try_from("smiley".to_string()).is_err());
        assert!(CharRange::try_from("U+27BF..U+2600".to_string()).is_err());
        assert!(CharRange::try_from("U+110000".to_string()).is_err());
    }

    #[test]
    fn test_char_range_serde() {
        let json = serde_json::to_string(&CharRange::new(0x2600, 0x27BF)).unwrap();
        assert_eq!(json, r#""U+2600..U+27BF""#);
        let back: CharRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CharRange::new(0x2600, 0x27BF));
    }

    #[test]
    fn test_default_ranges_spare_common_symbols() {
        let policy = ValidatorPolicy::default();
        for c in ['→', '°', '%', '€'] {
            assert!(
                !policy.emoji_ranges.iter().any(|r| r.contains(c)),
                "{c} should not count as emoji"
            );
        }
    }

    #[test]
    fn test_default_emoticons() {
        let emoticons = default_emoticons();
        assert_eq!(emoticons.len(), 16);
        assert!(emoticons.contains(&":-)".to_string()));
        assert!(emoticons.contains(&";P".to_string()));
    }
}
