//! Disease classifier service.
//!
//! Owns the loaded classifier artifact (lazy, once per process) and exposes
//! batch prediction over a feature table. Constructed once and injected into
//! the batch predictor; `reload` swaps in a freshly trained artifact.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifacts::{self, ArtifactPaths, ArtifactSlot, Loaded};
use super::features::{FeatureMetadata, FeatureTable};
use super::PredictionError;
use crate::ml::boosting::argmax;
use crate::ml::GradientBoostedClassifier;

/// Contents of `disease_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseMetadata {
    pub features: FeatureMetadata,
    pub allowed_codes: Vec<String>,
    pub code_labels: BTreeMap<String, String>,
    pub trained_at: DateTime<Utc>,
}

/// Classifier model + metadata, immutable once built.
#[derive(Debug, Clone)]
pub struct ClassifierArtifact {
    pub model: GradientBoostedClassifier,
    pub metadata: DiseaseMetadata,
}

impl ClassifierArtifact {
    pub fn load(paths: &ArtifactPaths) -> Result<Self, PredictionError> {
        let dir = paths.resolve(artifacts::DISEASE_GROUP)?;
        let model_path = dir.join(artifacts::CLASSIFIER_FILE);
        let model: GradientBoostedClassifier = artifacts::read_json(&model_path)?;
        let metadata: DiseaseMetadata = artifacts::read_json(&dir.join(artifacts::DISEASE_METADATA_FILE))?;
        let artifact = Self { model, metadata };
        artifact.validate().map_err(|reason| PredictionError::ArtifactLoad {
            path: model_path,
            reason,
        })?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.model.validate()?;
        let columns = self.metadata.features.feature_columns.len();
        if self.model.n_features() != columns {
            return Err(format!(
                "model expects {} features, metadata lists {columns} columns",
                self.model.n_features()
            ));
        }
        Ok(())
    }

    /// Arg-max label and full probability vector for every row.
    pub fn predict_batch(&self, table: &FeatureTable) -> Result<ClassifierOutput, PredictionError> {
        let expected = &self.metadata.features.feature_columns;
        if table.columns != *expected {
            return Err(PredictionError::ShapeMismatch {
                expected: expected.len(),
                actual: table.columns.len(),
            });
        }

        let classes = self.model.classes();
        let mut codes = Vec::with_capacity(table.len());
        let mut confidences = Vec::with_capacity(table.len());
        for row in &table.rows {
            let probs = self.model.predict_proba(row);
            let best = argmax(&probs).unwrap_or(0);
            codes.push(classes[best].clone());
            confidences.push(probs);
        }
        Ok(ClassifierOutput { codes, confidences })
    }
}

/// Raw classifier output, one entry per table row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    pub codes: Vec<String>,
    pub confidences: Vec<Vec<f32>>,
}

impl ClassifierOutput {
    /// Top-class probability for `row`.
    pub fn top_confidence(&self, row: usize) -> f32 {
        self.confidences
            .get(row)
            .and_then(|probs| probs.iter().copied().reduce(f32::max))
            .unwrap_or(0.0)
    }
}

// ═══════════════════════════════════════════════════════════
// DiseaseClassifierService
// ═══════════════════════════════════════════════════════════

pub struct DiseaseClassifierService {
    paths: Option<ArtifactPaths>,
    slot: ArtifactSlot<ClassifierArtifact>,
    invocations: AtomicUsize,
}

impl DiseaseClassifierService {
    /// Service that loads from `models_dir` on first use.
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: Some(ArtifactPaths::new(models_dir)),
            slot: ArtifactSlot::empty(),
            invocations: AtomicUsize::new(0),
        }
    }

    /// Service around an artifact already in memory.
    pub fn from_artifact(artifact: ClassifierArtifact) -> Self {
        Self {
            paths: None,
            slot: ArtifactSlot::with(artifact),
            invocations: AtomicUsize::new(0),
        }
    }

    fn load(&self) -> Result<ClassifierArtifact, PredictionError> {
        let paths = self
            .paths
            .as_ref()
            .ok_or_else(|| PredictionError::ModelUnavailable(PathBuf::from(artifacts::CLASSIFIER_FILE)))?;
        let artifact = ClassifierArtifact::load(paths)?;
        tracing::info!(
            dir = %paths.dir().display(),
            classes = artifact.model.classes().len(),
            vocabulary = artifact.metadata.features.vocabulary.len(),
            "Disease classifier loaded"
        );
        Ok(artifact)
    }

    /// The loaded artifact, loading it on first use.
    pub fn artifact(&self) -> Result<Arc<Loaded<ClassifierArtifact>>, PredictionError> {
        self.slot.get_or_load(|| self.load())
    }

    /// Load the artifact again from disk and swap it in atomically.
    pub fn reload(&self) -> Result<DateTime<Utc>, PredictionError> {
        let artifact = self.load()?;
        let loaded = self.slot.swap(artifact)?;
        tracing::info!("Disease classifier swapped");
        Ok(loaded.loaded_at)
    }

    pub fn is_available(&self) -> bool {
        self.artifact().is_ok()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.slot.current().ok().flatten().map(|l| l.loaded_at)
    }

    /// Run the model once over the whole table.
    pub fn predict_batch(&self, table: &FeatureTable) -> Result<ClassifierOutput, PredictionError> {
        let loaded = self.artifact()?;
        self.predict_with(&loaded, table)
    }

    /// Run a specific loaded artifact over the table. A batch that built its
    /// features from `loaded` must also score with it, whatever `reload` has
    /// swapped in since.
    pub fn predict_with(
        &self,
        loaded: &Loaded<ClassifierArtifact>,
        table: &FeatureTable,
    ) -> Result<ClassifierOutput, PredictionError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        loaded.artifact.predict_batch(table)
    }

    /// Human-readable label for a code, from the artifact's lookup table.
    pub fn label_for(&self, code: &str) -> Option<String> {
        let loaded = self.artifact().ok()?;
        loaded.artifact.metadata.code_labels.get(code).cloned()
    }

    /// Number of model invocations since construction.
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}
