//! Confidence & override policy applied to raw classifier output.
//!
//! Rules, first match wins:
//! 1. missing-data code (`N` / `n`) → Unspecified
//! 2. wound code without enough confidence or without a wound keyword → Unspecified
//! 3. confidence below the global threshold, or not a number → Unspecified
//! 4. allow-list configured and code not on it → Unspecified
//! 5. otherwise the code unchanged
//!
//! A wound prediction that clears rule 2 still goes through rules 3 and 4.

use std::collections::HashSet;

use super::types::{DiseaseLabel, MISSING_DATA_CODES};
use super::text;
use crate::config::PredictionConfig;

#[derive(Debug, Clone)]
pub struct ConfidencePolicy {
    pub min_confidence: f32,
    pub wound_code: String,
    pub wound_min_confidence: f32,
    pub wound_keywords: Vec<String>,
    pub allowed_codes: Option<HashSet<String>>,
}

impl ConfidencePolicy {
    /// Policy from prediction settings. An empty `allowed` slice disables
    /// the allow-list check.
    pub fn from_config(config: &PredictionConfig, allowed: &[String]) -> Self {
        Self {
            min_confidence: config.min_confidence,
            wound_code: config.wound_code.clone(),
            wound_min_confidence: config.wound_min_confidence,
            wound_keywords: config.wound_keywords.clone(),
            allowed_codes: (!allowed.is_empty()).then(|| allowed.iter().cloned().collect()),
        }
    }

    pub fn evaluate(&self, raw_label: &str, confidence: f32, text: &str) -> DiseaseLabel {
        if MISSING_DATA_CODES.contains(&raw_label) {
            return DiseaseLabel::Unspecified;
        }

        if raw_label == self.wound_code {
            let confident = confidence >= self.wound_min_confidence;
            if !confident || !text::contains_keyword(text, &self.wound_keywords) {
                tracing::debug!(confidence, "Wound prediction suppressed");
                return DiseaseLabel::Unspecified;
            }
        }

        if confidence.is_nan() || confidence < self.min_confidence {
            return DiseaseLabel::Unspecified;
        }

        if let Some(allowed) = &self.allowed_codes {
            if !allowed.contains(raw_label) {
                return DiseaseLabel::Unspecified;
            }
        }

        DiseaseLabel::Code(raw_label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allowed: &[&str]) -> ConfidencePolicy {
        let allowed: Vec<String> = allowed.iter().map(|c| c.to_string()).collect();
        ConfidencePolicy::from_config(&PredictionConfig::default(), &allowed)
    }

    fn code(c: &str) -> DiseaseLabel {
        DiseaseLabel::Code(c.into())
    }

    #[test]
    fn missing_data_codes_are_unspecified_even_when_confident() {
        let p = policy(&[]);
        assert_eq!(p.evaluate("N", 0.99, "fever"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("n", 0.99, "fever"), DiseaseLabel::Unspecified);
    }

    #[test]
    fn confidence_threshold_is_inclusive() {
        let p = policy(&[]);
        assert_eq!(p.evaluate("R50.9", 0.29, "fever"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("R50.9", 0.30, "fever"), code("R50.9"));
    }

    #[test]
    fn wound_needs_keyword_and_confidence() {
        let p = policy(&["T14.1"]);
        assert_eq!(p.evaluate("T14.1", 0.9, "may sugat sa binti"), code("T14.1"));
        assert_eq!(p.evaluate("T14.1", 0.9, "Laceration on arm"), code("T14.1"));
        assert_eq!(p.evaluate("T14.1", 0.9, "fever and cough"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("T14.1", 0.49, "deep cut"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("T14.1", 0.50, "deep cut"), code("T14.1"));
    }

    #[test]
    fn wound_at_sixty_percent_turns_on_the_keyword() {
        let p = policy(&["T14.1"]);
        assert_eq!(p.evaluate("T14.1", 0.60, "masakit ang binti"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("T14.1", 0.60, "masakit ang binti, laceration"), code("T14.1"));
    }

    #[test]
    fn nan_confidence_is_unspecified() {
        let p = policy(&[]);
        assert_eq!(p.evaluate("R50.9", f32::NAN, "fever"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("T14.1", f32::NAN, "laceration"), DiseaseLabel::Unspecified);
    }

    #[test]
    fn wound_keyword_must_be_whole_word() {
        let p = policy(&[]);
        assert_eq!(p.evaluate("T14.1", 0.9, "cutaneous rash"), DiseaseLabel::Unspecified);
    }

    #[test]
    fn allow_list_filters_unknown_codes() {
        let p = policy(&["A09", "R50.9"]);
        assert_eq!(p.evaluate("Z99", 0.95, "x"), DiseaseLabel::Unspecified);
        assert_eq!(p.evaluate("A09", 0.95, "x"), code("A09"));
    }

    #[test]
    fn allow_list_still_applies_to_wound_code() {
        let p = policy(&["A09"]);
        assert_eq!(p.evaluate("T14.1", 0.9, "sugat"), DiseaseLabel::Unspecified);
    }

    #[test]
    fn empty_allow_list_is_disabled() {
        assert!(policy(&[]).allowed_codes.is_none());
        assert_eq!(policy(&[]).evaluate("Z99", 0.95, ""), code("Z99"));
    }
}
