//! Offline training for the disease classifier and the time regressor.
//!
//! Both trainers serialize every artifact before touching the models
//! directory, then land the files together. A run that fails for any reason
//! leaves the directory as it was.

pub mod disease;
pub mod time;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{VitalDefaults, DEFAULT_ALLOWED_CODES};
use crate::ml::BoostingParams;
use crate::models::ReferralRecord;
use crate::pipeline::text::NO_SYMPTOM_TOKEN;

pub use disease::{train_disease_model, DiseaseTrainingReport};
pub use time::{train_time_model, TimeTrainingReport};

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    #[error("need at least two classes with two or more rows each, found {found}")]
    NeedTwoClasses { found: usize },

    #[error("Artifact write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A historical referral with its recorded diagnosis, as exported by the
/// referral application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    #[serde(flatten)]
    pub referral: ReferralRecord,
    #[serde(default)]
    pub diagnosis_code: Option<String>,
}

impl TrainingRecord {
    pub fn new(referral: ReferralRecord, diagnosis_code: Option<&str>) -> Self {
        Self {
            referral,
            diagnosis_code: diagnosis_code.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Codes the classifier may learn, with their display labels.
    pub allowed_codes: BTreeMap<String, String>,
    pub test_fraction: f32,
    pub boosting: BoostingParams,
    pub seed: u64,
    /// Vocabulary cap for the time model's TF-IDF vectorizer.
    pub tfidf_max_features: usize,
    pub fallback_token: String,
    /// Default age when no training row has one.
    pub fallback_age: f32,
    pub vital_defaults: VitalDefaults,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            allowed_codes: DEFAULT_ALLOWED_CODES
                .iter()
                .map(|(code, label)| (code.to_string(), label.to_string()))
                .collect(),
            test_fraction: 0.2,
            boosting: BoostingParams::default(),
            seed: 42,
            tfidf_max_features: 500,
            fallback_token: NO_SYMPTOM_TOKEN.to_string(),
            fallback_age: 30.0,
            vital_defaults: VitalDefaults::default(),
        }
    }
}

/// Median of the values, `None` when empty.
pub(crate) fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn median_handles_odd_even_and_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn default_config_allows_the_wound_code() {
        let config = TrainingConfig::default();
        assert!(config.allowed_codes.contains_key("T14.1"));
        assert_eq!(config.seed, 42);
        assert!((config.test_fraction - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn training_record_flattens_referral_fields() {
        let json = r#"{
            "id": 12,
            "symptoms": "ubo",
            "created_at": "2024-03-01T08:00:00Z",
            "diagnosis_code": "J06.9"
        }"#;
        let record: TrainingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.referral.id, 12);
        assert_eq!(record.referral.clinical_text(), "ubo");
        assert_eq!(record.diagnosis_code.as_deref(), Some("J06.9"));

        let round = TrainingRecord::new(ReferralRecord::new(1, Utc::now()), None);
        let value = serde_json::to_value(&round).unwrap();
        assert_eq!(value["id"], 1);
    }
}
