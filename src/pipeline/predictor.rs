//! Batch predictor: the single entry point the referral workflow calls.
//!
//! Every public method is total. Service failures are logged here and
//! degrade to sentinels; nothing below this layer is allowed to reach the
//! caller as an error.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::cache::PredictionCache;
use super::classifier::DiseaseClassifierService;
use super::features::build_features;
use super::policy::ConfidencePolicy;
use super::regressor::TimeRegressorService;
use super::types::{BatchPredictions, CateringTime, DiseaseLabel, ReferralPrediction};
use super::PredictionError;
use crate::config::PredictionConfig;
use crate::models::{ReferralId, ReferralRecord};

pub struct BatchPredictor {
    classifier: Arc<DiseaseClassifierService>,
    regressor: Arc<TimeRegressorService>,
    cache: Arc<dyn PredictionCache>,
    config: PredictionConfig,
}

impl BatchPredictor {
    pub fn new(
        classifier: Arc<DiseaseClassifierService>,
        regressor: Arc<TimeRegressorService>,
        cache: Arc<dyn PredictionCache>,
        config: PredictionConfig,
    ) -> Self {
        Self {
            classifier,
            regressor,
            cache,
            config,
        }
    }

    /// Predictor over the artifacts in `models_dir`, loaded on first use.
    pub fn from_models_dir(
        models_dir: &Path,
        cache: Arc<dyn PredictionCache>,
        config: PredictionConfig,
    ) -> Self {
        let classifier = DiseaseClassifierService::new(models_dir);
        let regressor = TimeRegressorService::new(models_dir, config.vital_defaults);
        Self::new(Arc::new(classifier), Arc::new(regressor), cache, config)
    }

    pub fn classifier(&self) -> &DiseaseClassifierService {
        &self.classifier
    }

    pub fn regressor(&self) -> &TimeRegressorService {
        &self.regressor
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    // ── Disease ──────────────────────────────────────────

    /// Disease label for every input id. Ids the model could not score map
    /// to `NoPrediction`.
    pub fn predict_diseases_batch(
        &self,
        records: &[ReferralRecord],
    ) -> HashMap<ReferralId, DiseaseLabel> {
        let mut labels: HashMap<ReferralId, DiseaseLabel> = records
            .iter()
            .map(|r| (r.id, DiseaseLabel::NoPrediction))
            .collect();
        if records.is_empty() {
            return labels;
        }

        match self.score_diseases(records) {
            Ok(scored) => labels.extend(scored),
            Err(e) => tracing::warn!(
                batch = records.len(),
                error = %e,
                "Disease prediction unavailable for batch"
            ),
        }
        labels
    }

    fn score_diseases(
        &self,
        records: &[ReferralRecord],
    ) -> Result<Vec<(ReferralId, DiseaseLabel)>, PredictionError> {
        let loaded = self.classifier.artifact()?;
        let metadata = &loaded.artifact.metadata;

        let table = build_features(records, &metadata.features);
        if table.is_empty() {
            return Ok(Vec::new());
        }
        if table.len() != records.len() {
            return Err(PredictionError::FeatureBuild(format!(
                "{} rows for {} records",
                table.len(),
                records.len()
            )));
        }

        let output = self.classifier.predict_with(&loaded, &table)?;
        let policy = ConfidencePolicy::from_config(&self.config, &metadata.allowed_codes);

        Ok(records
            .iter()
            .zip(&output.codes)
            .enumerate()
            .map(|(i, (record, raw))| {
                let label = policy.evaluate(raw, output.top_confidence(i), record.clinical_text());
                (record.id, label)
            })
            .collect())
    }

    // ── Time to cater ────────────────────────────────────

    /// Predicted minutes to cater. Ids whose vitals do not parse, or any id
    /// when the regressor is unavailable, are absent.
    pub fn predict_times_batch(&self, records: &[ReferralRecord]) -> HashMap<ReferralId, i64> {
        if records.is_empty() {
            return HashMap::new();
        }
        match self.regressor.predict_hours(records) {
            Ok(hours) => hours
                .into_iter()
                .filter_map(|(id, h)| CateringTime::from_hours(h).minutes().map(|m| (id, m)))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    batch = records.len(),
                    error = %e,
                    "Time prediction unavailable for batch"
                );
                HashMap::new()
            }
        }
    }

    // ── Combined, cached ─────────────────────────────────

    /// Disease and time for every input id, served from the cache when a
    /// live entry exists for this batch's key.
    pub fn predict_all_batch(&self, records: &[ReferralRecord]) -> BatchPredictions {
        let key = self.config.cache_key.key_for(records);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, entries = hit.len(), "Prediction cache hit");
            return hit.normalized();
        }

        let diseases = self.predict_diseases_batch(records);
        let times = self.predict_times_batch(records);

        let result: BatchPredictions = records
            .iter()
            .map(|r| {
                let disease = diseases
                    .get(&r.id)
                    .cloned()
                    .unwrap_or(DiseaseLabel::NoPrediction);
                let catering_time = times
                    .get(&r.id)
                    .map_or(CateringTime::NotAvailable, |&m| CateringTime::Minutes(m));
                (r.id, ReferralPrediction { disease, catering_time })
            })
            .collect();

        let degraded = result
            .0
            .values()
            .all(|p| p.disease == DiseaseLabel::NoPrediction);
        if degraded && !result.is_empty() {
            tracing::warn!(key = %key, "Not caching batch without any disease prediction");
        } else {
            self.cache.set(&key, result.clone(), self.config.cache_ttl());
        }

        tracing::info!(
            batch = records.len(),
            timed = times.len(),
            "Batch predictions computed"
        );
        result
    }
}
