use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vital_sign::{FieldValue, VitalSigns};

/// Stable referral identifier from the referral workflow.
pub type ReferralId = i64;

/// Normalized patient sex used by the feature builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    M,
    F,
    Unknown,
}

/// Case-insensitive spellings accepted for each sex.
const SEX_LOOKUP: &[(&str, Sex)] = &[
    ("m", Sex::M),
    ("male", Sex::M),
    ("lalaki", Sex::M),
    ("f", Sex::F),
    ("female", Sex::F),
    ("babae", Sex::F),
];

impl Sex {
    pub fn normalize(raw: Option<&str>) -> Sex {
        let Some(raw) = raw else {
            return Sex::Unknown;
        };
        let lower = raw.trim().to_lowercase();
        SEX_LOOKUP
            .iter()
            .find(|(key, _)| *key == lower)
            .map(|(_, sex)| *sex)
            .unwrap_or(Sex::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::M => "M",
            Sex::F => "F",
            Sex::Unknown => "Unknown",
        }
    }
}

/// The patient linked to a referral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patient {
    pub age: Option<FieldValue>,
    pub sex: Option<String>,
}

impl Patient {
    pub fn new(age: impl Into<FieldValue>, sex: &str) -> Self {
        Self {
            age: Some(age.into()),
            sex: Some(sex.to_string()),
        }
    }

    pub fn sex(&self) -> Sex {
        Sex::normalize(self.sex.as_deref())
    }

    pub fn age_years(&self) -> Option<f32> {
        self.age.as_ref().and_then(FieldValue::as_number).map(|a| a as f32)
    }
}

/// A referral as supplied by the surrounding application. Never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub id: ReferralId,
    #[serde(default)]
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub vitals: VitalSigns,
    #[serde(default)]
    pub patient: Patient,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReferralRecord {
    pub fn new(id: ReferralId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            chief_complaint: None,
            symptoms: None,
            vitals: VitalSigns::default(),
            patient: Patient::default(),
            created_at,
            completed_at: None,
        }
    }

    pub fn with_complaint(mut self, text: &str) -> Self {
        self.chief_complaint = Some(text.to_string());
        self
    }

    pub fn with_symptoms(mut self, text: &str) -> Self {
        self.symptoms = Some(text.to_string());
        self
    }

    pub fn with_patient(mut self, patient: Patient) -> Self {
        self.patient = patient;
        self
    }

    pub fn with_vitals(mut self, vitals: VitalSigns) -> Self {
        self.vitals = vitals;
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Symptom text when present, else chief complaint, else empty.
    pub fn clinical_text(&self) -> &str {
        [self.symptoms.as_deref(), self.chief_complaint.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .unwrap_or("")
    }

    /// Wall-clock time from creation to completion, in hours.
    pub fn hours_to_complete(&self) -> Option<f32> {
        self.completed_at
            .map(|done| (done - self.created_at).num_seconds() as f32 / 3600.0)
    }
}
