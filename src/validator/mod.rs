//! Response validation for the DRIVING state
//!
//! Every response the assistant is about to speak passes through
//! [`ResponseValidator::validate`]. Outside DRIVING nothing is restricted.
//! While DRIVING the text must be short, must not ask questions and must not
//! carry affectionate language, filler or emoji. A failing response gets one
//! cleanup pass and otherwise is replaced by the fallback phrase, so the
//! driver always hears something compliant.
//!
//! The policy is content-based: it does not matter which model, language or
//! prompt produced the text.

mod check;
mod policy;
mod sanitize;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::state::VehicleState;

pub use check::{ValidationReason, Violation};
pub use policy::{CharRange, ValidatorPolicy, DEFAULT_EMOJI_RANGES};

/// Outcome of validating one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Text to deliver: the input, a cleaned version, or the fallback phrase
    pub sanitized_text: String,
    /// First failed rule on the original text, or `Sanitized`
    pub reason: Option<ValidationReason>,
    /// The input, kept for audit even when replaced
    pub original_text: String,
    /// Every rule the original text failed
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    fn passed(text: &str) -> Self {
        Self {
            is_valid: true,
            sanitized_text: text.to_owned(),
            reason: None,
            original_text: text.to_owned(),
            violations: Vec::new(),
        }
    }
}

/// Which canned phrase to use when there is nothing better to say
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    NonEssential,
    Invalid,
    /// Upstream generation failed
    Error,
}

/// Stateless checker for a fixed [`ValidatorPolicy`]
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    policy: ValidatorPolicy,
    /// Lower-cased copies of the policy's term lists
    affectionate_terms: Vec<String>,
    narrative_markers: Vec<String>,
}

impl ResponseValidator {
    /// Compile `policy`, refusing one whose own fallback phrases would fail it
    pub fn new(policy: ValidatorPolicy) -> Result<Self, ConfigError> {
        if policy.max_len == 0 {
            return Err(ConfigError::ZeroMaxLen);
        }

        let lower = |terms: &[String]| -> Vec<String> {
            terms
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect()
        };

        let validator = Self {
            affectionate_terms: lower(&policy.affectionate_terms),
            narrative_markers: lower(&policy.narrative_markers),
            policy,
        };

        for phrase in [&validator.policy.fallback_phrase, &validator.policy.error_phrase] {
            if phrase.trim().is_empty() || !validator.check(phrase).is_empty() {
                return Err(ConfigError::NonCompliantFallback {
                    phrase: phrase.clone(),
                });
            }
        }

        Ok(validator)
    }

    pub fn policy(&self) -> &ValidatorPolicy {
        &self.policy
    }

    /// Judge `text` for delivery in `state`
    pub fn validate(&self, text: &str, state: VehicleState) -> ValidationResult {
        if state != VehicleState::Driving {
            return ValidationResult::passed(text);
        }

        let violations = self.check(text);
        let Some(first) = violations.first().map(Violation::reason) else {
            return ValidationResult::passed(text);
        };

        let candidate = sanitize::sanitize(text, self);
        if !candidate.is_empty() && self.check(&candidate).is_empty() {
            debug!(
                reason = %first,
                original_len = text.chars().count(),
                sanitized_len = candidate.chars().count(),
                "driving response sanitized"
            );
            return ValidationResult {
                is_valid: true,
                sanitized_text: candidate,
                reason: Some(ValidationReason::Sanitized),
                original_text: text.to_owned(),
                violations,
            };
        }

        info!(
            reason = %first,
            violations = violations.len(),
            "driving response replaced with fallback"
        );
        ValidationResult {
            is_valid: false,
            sanitized_text: self.policy.fallback_phrase.clone(),
            reason: Some(first),
            original_text: text.to_owned(),
            violations,
        }
    }

    /// Run every driving rule in order and collect the failures
    pub fn check(&self, text: &str) -> Vec<Violation> {
        let text = text.trim();
        let mut violations = Vec::new();

        let length = text.chars().count();
        if length > self.policy.max_len {
            violations.push(Violation::TooLong {
                length,
                max_len: self.policy.max_len,
            });
        }

        if !self.policy.allow_questions && check::has_question(text) {
            violations.push(Violation::ContainsQuestion);
        }

        let lowered = text.to_lowercase();
        if !self.policy.allow_emotion {
            if let Some(term) = check::find_term(&lowered, &self.affectionate_terms) {
                violations.push(Violation::ContainsAffectionateTerm {
                    term: term.to_owned(),
                });
            }
        }

        if let Some(marker) = check::find_term(&lowered, &self.narrative_markers) {
            violations.push(Violation::ContainsNarrativeMarker {
                marker: marker.to_owned(),
            });
        }

        if let Some(found) = check::find_emoji(text, &self.policy.emoji_ranges, &self.policy.emoticons) {
            violations.push(Violation::ContainsEmoji { found });
        }

        violations
    }

    /// Build a `metric → interpretation → action` line that fits `max_len`
    pub fn format_driving_response(&self, metric: &str, interpretation: &str, action: &str) -> String {
        let max_len = self.policy.max_len;

        let arrows = format!("{metric} → {interpretation} → {action}");
        if arrows.chars().count() <= max_len {
            return arrows;
        }

        let compact = format!("{metric}: {interpretation}. {action}");
        if compact.chars().count() <= max_len {
            return compact;
        }

        // Last resort: shorten the action, then the whole line
        let prefix = format!("{metric}: {interpretation}. ");
        let available = max_len.saturating_sub(prefix.chars().count());
        let action: String = action.chars().take(available).collect();
        let line = format!("{prefix}{}", action.trim_end());
        line.chars().take(max_len).collect::<String>().trim_end().to_owned()
    }

    pub fn fallback_for(&self, kind: FallbackKind) -> &str {
        match kind {
            FallbackKind::NonEssential | FallbackKind::Invalid => &self.policy.fallback_phrase,
            FallbackKind::Error => &self.policy.error_phrase,
        }
    }

    /// Whether a lower-cased fragment contains a term the policy forbids
    pub(crate) fn has_disallowed_term(&self, lowered: &str) -> bool {
        (!self.policy.allow_emotion && check::find_term(lowered, &self.affectionate_terms).is_some())
            || check::find_term(lowered, &self.narrative_markers).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ResponseValidator {
        ResponseValidator::new(ValidatorPolicy::default()).unwrap()
    }

    #[test]
    fn test_structured_response_passes_unchanged() {
        let text = "Coolant: 92°C → Normal range → Continue monitoring.";
        let result = validator().validate(text, VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.sanitized_text, text);
        assert_eq!(result.reason, None);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_question_falls_back() {
        let text = "Your coolant temp looks great! Want me to explain more?";
        let result = validator().validate(text, VehicleState::Driving);
        assert!(!result.is_valid);
        assert_eq!(result.sanitized_text, "Monitoring.");
        assert_eq!(result.reason, Some(ValidationReason::ContainsQuestion));
        assert!(result.violations.contains(&Violation::ContainsQuestion));
        assert_eq!(result.original_text, text);
    }

    #[test]
    fn test_parked_and_garage_unrestricted() {
        let text = "Your coolant is sitting at 92°C, which is perfectly normal, love! \
                    The MK6's TSI runs a bit warm by design, you know. 😊 \
                    Want me to explain more about the cooling system?";
        for state in [VehicleState::Parked, VehicleState::Garage] {
            let result = validator().validate(text, state);
            assert!(result.is_valid);
            assert_eq!(result.sanitized_text, text);
            assert_eq!(result.reason, None);
        }
    }

    #[test]
    fn test_affectionate_term_sanitized() {
        let text = "Temperature looks good, love. Keep driving safe!";
        let result = validator().validate(text, VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.reason, Some(ValidationReason::Sanitized));
        assert_eq!(result.sanitized_text, "Temperature looks good. Keep driving safe!");
        assert_eq!(
            result.violations,
            vec![Violation::ContainsAffectionateTerm {
                term: "love".into()
            }]
        );
    }

    #[test]
    fn test_long_response_truncated_to_first_sentence() {
        let first = "Your coolant temperature is currently sitting at 92 degrees Celsius, \
                     which is perfectly normal and healthy for your GTI MK6.";
        let text = format!("{first} The TSI engine runs a bit warm by design, so no worries!");
        assert!(first.chars().count() <= 150);
        assert!(text.chars().count() > 150);

        let result = validator().validate(&text, VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.reason, Some(ValidationReason::Sanitized));
        assert_eq!(result.sanitized_text, first);
    }

    #[test]
    fn test_unfixable_records_first_failure() {
        // One long run-on sentence: no boundary to cut at
        let text = format!("Honestly {} ok?", "the engine is fine and ".repeat(8));
        let result = validator().validate(&text, VehicleState::Driving);
        assert!(!result.is_valid);
        assert_eq!(result.sanitized_text, "Monitoring.");
        assert_eq!(result.reason, Some(ValidationReason::TooLong));
        let reasons: Vec<_> = result.violations.iter().map(Violation::reason).collect();
        assert_eq!(
            reasons,
            vec![
                ValidationReason::TooLong,
                ValidationReason::ContainsQuestion,
                ValidationReason::ContainsNarrativeMarker,
            ]
        );
    }

    #[test]
    fn test_emoji_stripped() {
        let result = validator().validate("Tire pressure normal 👍", VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.reason, Some(ValidationReason::Sanitized));
        assert_eq!(result.sanitized_text, "Tire pressure normal");
    }

    #[test]
    fn test_obd_codes_are_not_emoticons() {
        let text = "Code:P0420 → Catalyst below threshold → Schedule service.";
        let result = validator().validate(text, VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn test_empty_response_is_valid() {
        let result = validator().validate("   ", VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.sanitized_text, "   ");
    }

    #[test]
    fn test_revalidating_output_is_always_valid() {
        let v = validator();
        let inputs = [
            "Coolant: 92°C → Normal range → Continue monitoring.",
            "Your coolant temp looks great! Want me to explain more?",
            "Actually, you know, the coolant temp is 92°C which is totally normal! 😊",
            "Temperature looks good, love. Keep driving safe!",
            "By the way, darling, fun fact: the turbo spools at 2000 rpm :D",
            "",
        ];
        for input in inputs {
            let first = v.validate(input, VehicleState::Driving);
            let second = v.validate(&first.sanitized_text, VehicleState::Driving);
            assert!(second.is_valid, "re-validating {:?} failed", first.sanitized_text);
            assert_eq!(second.sanitized_text, first.sanitized_text);
        }
    }

    #[test]
    fn test_policy_switches() {
        let policy = ValidatorPolicy {
            allow_questions: true,
            allow_emotion: true,
            ..ValidatorPolicy::default()
        };
        let v = ResponseValidator::new(policy).unwrap();
        let result = v.validate("All good, dear. Anything else?", VehicleState::Driving);
        assert!(result.is_valid);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn test_custom_max_len() {
        let policy = ValidatorPolicy {
            max_len: 20,
            ..ValidatorPolicy::default()
        };
        let v = ResponseValidator::new(policy).unwrap();
        let result = v.validate("Oil is fine. Coolant is fine too.", VehicleState::Driving);
        assert_eq!(result.sanitized_text, "Oil is fine.");
    }

    #[test]
    fn test_rejects_bad_policy() {
        let zero = ValidatorPolicy {
            max_len: 0,
            ..ValidatorPolicy::default()
        };
        assert!(matches!(ResponseValidator::new(zero), Err(ConfigError::ZeroMaxLen)));

        let chatty = ValidatorPolicy {
            error_phrase: "Oops, honey!".into(),
            ..ValidatorPolicy::default()
        };
        assert!(matches!(
            ResponseValidator::new(chatty),
            Err(ConfigError::NonCompliantFallback { .. })
        ));
    }

    #[test]
    fn test_format_driving_response() {
        let v = validator();
        let line = v.format_driving_response("RPM: 3000", "High revs", "Shift up");
        assert_eq!(line, "RPM: 3000 → High revs → Shift up");
        assert!(v.validate(&line, VehicleState::Driving).is_valid);

        let tight = ResponseValidator::new(ValidatorPolicy {
            max_len: 30,
            ..ValidatorPolicy::default()
        })
        .unwrap();
        let line = tight.format_driving_response("Coolant: 92°C", "Normal range", "Continue monitoring");
        assert!(line.chars().count() <= 30);
        assert!(line.starts_with("Coolant: 92°C: Normal range."));
    }

    #[test]
    fn test_fallback_for() {
        let v = validator();
        assert_eq!(v.fallback_for(FallbackKind::NonEssential), "Monitoring.");
        assert_eq!(v.fallback_for(FallbackKind::Invalid), "Monitoring.");
        assert_eq!(v.fallback_for(FallbackKind::Error), "Acknowledged.");
    }
}
