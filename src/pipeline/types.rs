use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::ReferralId;

pub const UNSPECIFIED: &str = "Unspecified";
pub const NO_PREDICTION: &str = "No prediction";
pub const NOT_AVAILABLE: &str = "N/A";

/// Raw labels meaning "no diagnosis recorded" in the training data.
pub const MISSING_DATA_CODES: &[&str] = &["N", "n"];

/// Disease output for one referral: a code or one of two sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiseaseLabel {
    Code(String),
    /// The model answered, but the policy rejected the answer.
    Unspecified,
    /// Prediction could not be attempted at all.
    NoPrediction,
}

impl DiseaseLabel {
    pub fn as_str(&self) -> &str {
        match self {
            DiseaseLabel::Code(code) => code,
            DiseaseLabel::Unspecified => UNSPECIFIED,
            DiseaseLabel::NoPrediction => NO_PREDICTION,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            DiseaseLabel::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Map legacy missing-data codes onto `Unspecified`. Idempotent.
    pub fn normalized(self) -> Self {
        match self {
            DiseaseLabel::Code(code) if MISSING_DATA_CODES.contains(&code.as_str()) => {
                DiseaseLabel::Unspecified
            }
            other => other,
        }
    }
}

impl From<String> for DiseaseLabel {
    fn from(value: String) -> Self {
        match value.as_str() {
            UNSPECIFIED => DiseaseLabel::Unspecified,
            NO_PREDICTION => DiseaseLabel::NoPrediction,
            _ => DiseaseLabel::Code(value),
        }
    }
}

impl From<DiseaseLabel> for String {
    fn from(value: DiseaseLabel) -> Self {
        match value {
            DiseaseLabel::Code(code) => code,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for DiseaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted time to cater, in whole minutes, or "N/A".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CateringTime {
    Minutes(i64),
    NotAvailable,
}

impl CateringTime {
    /// `round(hours * 60)`, floored at zero. Non-finite input is unavailable.
    pub fn from_hours(hours: f32) -> Self {
        if !hours.is_finite() {
            return CateringTime::NotAvailable;
        }
        CateringTime::Minutes(((hours * 60.0).round() as i64).max(0))
    }

    pub fn minutes(&self) -> Option<i64> {
        match self {
            CateringTime::Minutes(m) => Some(*m),
            CateringTime::NotAvailable => None,
        }
    }
}

impl fmt::Display for CateringTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CateringTime::Minutes(m) => write!(f, "{m}"),
            CateringTime::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for CateringTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CateringTime::Minutes(m) => serializer.serialize_i64(*m),
            CateringTime::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for CateringTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Minutes(i64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Minutes(m) => Ok(CateringTime::Minutes(m)),
            Raw::Text(s) if s == NOT_AVAILABLE => Ok(CateringTime::NotAvailable),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected minutes or \"{NOT_AVAILABLE}\", got {s:?}"
            ))),
        }
    }
}

/// The (disease, duration) pair handed back to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralPrediction {
    pub disease: DiseaseLabel,
    pub catering_time: CateringTime,
}

/// Per-referral predictions for one batch, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchPredictions(pub BTreeMap<ReferralId, ReferralPrediction>);

impl BatchPredictions {
    pub fn get(&self, id: ReferralId) -> Option<&ReferralPrediction> {
        self.0.get(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-apply sentinel normalization to every disease label.
    pub fn normalized(self) -> Self {
        BatchPredictions(
            self.0
                .into_iter()
                .map(|(id, p)| {
                    (
                        id,
                        ReferralPrediction {
                            disease: p.disease.normalized(),
                            catering_time: p.catering_time,
                        },
                    )
                })
                .collect(),
        )
    }
}

impl FromIterator<(ReferralId, ReferralPrediction)> for BatchPredictions {
    fn from_iter<I: IntoIterator<Item = (ReferralId, ReferralPrediction)>>(iter: I) -> Self {
        BatchPredictions(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_codes_normalize_to_unspecified() {
        assert_eq!(DiseaseLabel::Code("N".into()).normalized(), DiseaseLabel::Unspecified);
        assert_eq!(DiseaseLabel::Code("n".into()).normalized(), DiseaseLabel::Unspecified);
        assert_eq!(
            DiseaseLabel::Code("J06.9".into()).normalized(),
            DiseaseLabel::Code("J06.9".into())
        );
        assert_eq!(DiseaseLabel::NoPrediction.normalized(), DiseaseLabel::NoPrediction);
    }

    #[test]
    fn labels_serialize_as_plain_strings() {
        let json = serde_json::to_string(&vec![
            DiseaseLabel::Code("T14.1".into()),
            DiseaseLabel::Unspecified,
            DiseaseLabel::NoPrediction,
        ])
        .unwrap();
        assert_eq!(json, r#"["T14.1","Unspecified","No prediction"]"#);
        let back: Vec<DiseaseLabel> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[1], DiseaseLabel::Unspecified);
    }

    #[test]
    fn hours_round_to_whole_minutes() {
        assert_eq!(CateringTime::from_hours(1.5), CateringTime::Minutes(90));
        assert_eq!(CateringTime::from_hours(0.0083), CateringTime::Minutes(0));
        assert_eq!(CateringTime::from_hours(0.01), CateringTime::Minutes(1));
        assert_eq!(CateringTime::from_hours(-2.0), CateringTime::Minutes(0));
        assert_eq!(CateringTime::from_hours(f32::NAN), CateringTime::NotAvailable);
    }

    #[test]
    fn catering_time_serializes_minutes_or_na() {
        assert_eq!(serde_json::to_string(&CateringTime::Minutes(45)).unwrap(), "45");
        assert_eq!(serde_json::to_string(&CateringTime::NotAvailable).unwrap(), "\"N/A\"");
        let back: CateringTime = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(back, CateringTime::NotAvailable);
        assert!(serde_json::from_str::<CateringTime>("\"soon\"").is_err());
    }

    #[test]
    fn batch_predictions_serialize_in_id_order() {
        let batch: BatchPredictions = vec![
            (
                2,
                ReferralPrediction {
                    disease: DiseaseLabel::Unspecified,
                    catering_time: CateringTime::NotAvailable,
                },
            ),
            (
                1,
                ReferralPrediction {
                    disease: DiseaseLabel::Code("A09".into()),
                    catering_time: CateringTime::Minutes(30),
                },
            ),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(
            json,
            r#"{"1":{"disease":"A09","catering_time":30},"2":{"disease":"Unspecified","catering_time":"N/A"}}"#
        );
    }
}
