//! Time-to-cater regressor service.
//!
//! Rows are the eight vital signs (column order of `VitalType::ALL`) followed
//! by the TF-IDF weights of the cleaned clinical text. Output is hours.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifacts::{self, ArtifactPaths, ArtifactSlot, Loaded};
use super::text;
use super::PredictionError;
use crate::config::VitalDefaults;
use crate::ml::{GradientBoostedRegressor, TfidfVectorizer};
use crate::models::{ReferralId, ReferralRecord, VitalType};

/// Names of the vital columns, in row order.
pub fn vital_columns() -> Vec<String> {
    VitalType::ALL.iter().map(|v| v.as_str().to_string()).collect()
}

/// Contents of `time_regressor.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeModelFile {
    pub model: GradientBoostedRegressor,
    pub vital_fields: Vec<String>,
    pub trained_at: DateTime<Utc>,
}

/// Regressor + the vectorizer it was trained with.
#[derive(Debug, Clone)]
pub struct RegressorArtifact {
    pub model: GradientBoostedRegressor,
    pub vectorizer: TfidfVectorizer,
    pub trained_at: DateTime<Utc>,
}

impl RegressorArtifact {
    pub fn new(model: GradientBoostedRegressor, vectorizer: TfidfVectorizer) -> Self {
        Self {
            model,
            vectorizer,
            trained_at: Utc::now(),
        }
    }

    pub fn load(paths: &ArtifactPaths) -> Result<Self, PredictionError> {
        let dir = paths.resolve(artifacts::TIME_GROUP)?;
        let model_path = dir.join(artifacts::REGRESSOR_FILE);
        let file: TimeModelFile = artifacts::read_json(&model_path)?;
        let vectorizer: TfidfVectorizer = artifacts::read_json(&dir.join(artifacts::VECTORIZER_FILE))?;
        let invalid = |reason: String| PredictionError::ArtifactLoad {
            path: model_path.clone(),
            reason,
        };
        if file.vital_fields != vital_columns() {
            return Err(invalid(format!("unexpected vital columns {:?}", file.vital_fields)));
        }
        vectorizer.validate().map_err(invalid)?;
        let artifact = Self {
            model: file.model,
            vectorizer,
            trained_at: file.trained_at,
        };
        artifact.validate().map_err(invalid)?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.model.validate()?;
        let expected = VitalType::ALL.len() + self.vectorizer.len();
        if self.model.n_features() != expected {
            return Err(format!(
                "regressor expects {} features, vitals + vocabulary give {expected}",
                self.model.n_features()
            ));
        }
        Ok(())
    }

    pub fn to_file(&self) -> TimeModelFile {
        TimeModelFile {
            model: self.model.clone(),
            vital_fields: vital_columns(),
            trained_at: self.trained_at,
        }
    }

    /// Feature row for one record, or the vital that failed to parse.
    pub fn row_for(
        &self,
        record: &ReferralRecord,
        defaults: &VitalDefaults,
    ) -> Result<Vec<f32>, PredictionError> {
        let vitals = record
            .vitals
            .coerce(defaults)
            .map_err(|(field, value)| PredictionError::VitalParse {
                referral_id: record.id,
                field: field.as_str(),
                value,
            })?;
        let tokens = text::clean_tokens(record.clinical_text());
        let mut row = vitals.to_vec();
        row.extend(self.vectorizer.transform(&tokens));
        Ok(row)
    }
}

// ═══════════════════════════════════════════════════════════
// TimeRegressorService
// ═══════════════════════════════════════════════════════════

pub struct TimeRegressorService {
    paths: Option<ArtifactPaths>,
    slot: ArtifactSlot<RegressorArtifact>,
    defaults: VitalDefaults,
    invocations: AtomicUsize,
}

impl TimeRegressorService {
    pub fn new(models_dir: impl Into<PathBuf>, defaults: VitalDefaults) -> Self {
        Self {
            paths: Some(ArtifactPaths::new(models_dir)),
            slot: ArtifactSlot::empty(),
            defaults,
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn from_artifact(artifact: RegressorArtifact, defaults: VitalDefaults) -> Self {
        Self {
            paths: None,
            slot: ArtifactSlot::with(artifact),
            defaults,
            invocations: AtomicUsize::new(0),
        }
    }

    fn load(&self) -> Result<RegressorArtifact, PredictionError> {
        let paths = self
            .paths
            .as_ref()
            .ok_or_else(|| PredictionError::ModelUnavailable(PathBuf::from(artifacts::REGRESSOR_FILE)))?;
        let artifact = RegressorArtifact::load(paths)?;
        tracing::info!(
            dir = %paths.dir().display(),
            features = artifact.model.n_features(),
            vocabulary = artifact.vectorizer.len(),
            "Time regressor loaded"
        );
        Ok(artifact)
    }

    pub fn artifact(&self) -> Result<Arc<Loaded<RegressorArtifact>>, PredictionError> {
        self.slot.get_or_load(|| self.load())
    }

    pub fn reload(&self) -> Result<DateTime<Utc>, PredictionError> {
        let artifact = self.load()?;
        let loaded = self.slot.swap(artifact)?;
        tracing::info!("Time regressor swapped");
        Ok(loaded.loaded_at)
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.slot.current().ok().flatten().map(|l| l.loaded_at)
    }

    /// Predicted hours per record.
    ///
    /// Records whose vitals do not parse are left out of the result. The
    /// model runs once over the rows that did parse, and not at all when
    /// none did.
    pub fn predict_hours(
        &self,
        records: &[ReferralRecord],
    ) -> Result<Vec<(ReferralId, f32)>, PredictionError> {
        let loaded = self.artifact()?;
        let artifact = &loaded.artifact;

        let mut ids = Vec::with_capacity(records.len());
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match artifact.row_for(record, &self.defaults) {
                Ok(row) => {
                    ids.push(record.id);
                    rows.push(row);
                }
                Err(e) => tracing::debug!(referral_id = record.id, error = %e, "Skipping referral"),
            }
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        self.invocations.fetch_add(1, Ordering::Relaxed);
        Ok(ids
            .into_iter()
            .zip(rows.iter().map(|row| artifact.model.predict_row(row)))
            .collect())
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{RegressionTree, TreeNode};
    use crate::models::VitalSigns;

    /// 2 hours baseline, +1 hour when temperature (column 6) is above 38.
    fn artifact() -> RegressorArtifact {
        let tree = RegressionTree::from_nodes(vec![
            TreeNode::Split { feature: 6, threshold: 38.0, left: 1, right: 2 },
            TreeNode::Leaf { value: 0.0 },
            TreeNode::Leaf { value: 1.0 },
        ]);
        let vectorizer = TfidfVectorizer::fit(&[vec!["fever".to_string()]], 10);
        let n = VitalType::ALL.len() + vectorizer.len();
        RegressorArtifact::new(GradientBoostedRegressor::new(2.0, 1.0, vec![tree], n), vectorizer)
    }

    fn record(id: i64, temperature: &str) -> ReferralRecord {
        ReferralRecord::new(id, Utc::now())
            .with_symptoms("lagnat")
            .with_vitals(VitalSigns {
                temperature: Some(temperature.into()),
                ..Default::default()
            })
    }

    #[test]
    fn row_layout_is_vitals_then_text() {
        let a = artifact();
        let row = a.row_for(&record(1, "39"), &VitalDefaults::default()).unwrap();
        assert_eq!(row.len(), 9);
        assert_eq!(row[6], 39.0);
        assert!((row[8] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn predicts_hours_and_skips_unparseable() {
        let service = TimeRegressorService::from_artifact(artifact(), VitalDefaults::default());
        let out = service
            .predict_hours(&[record(1, "39.2"), record(2, "mainit"), record(3, "")])
            .unwrap();
        assert_eq!(out, vec![(1, 3.0), (3, 2.0)]);
        assert_eq!(service.invocation_count(), 1);
    }

    #[test]
    fn no_parseable_rows_means_no_invocation() {
        let service = TimeRegressorService::from_artifact(artifact(), VitalDefaults::default());
        let out = service.predict_hours(&[record(1, "hot")]).unwrap();
        assert!(out.is_empty());
        assert_eq!(service.invocation_count(), 0);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = artifact();
        artifacts::write_all_atomically(
            dir.path(),
            artifacts::TIME_GROUP,
            &[
                (artifacts::REGRESSOR_FILE, serde_json::to_string(&a.to_file()).unwrap()),
                (artifacts::VECTORIZER_FILE, serde_json::to_string(&a.vectorizer).unwrap()),
            ],
        )
        .unwrap();
        let service = TimeRegressorService::new(dir.path(), VitalDefaults::default());
        let out = service.predict_hours(&[record(5, "37")]).unwrap();
        assert_eq!(out, vec![(5, 2.0)]);
        assert!(service.reload().is_ok());
    }

    #[test]
    fn missing_files_are_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = TimeRegressorService::new(dir.path(), VitalDefaults::default());
        let err = service.predict_hours(&[record(1, "37")]).unwrap_err();
        assert!(matches!(err, PredictionError::ModelUnavailable(_)));
    }
}
