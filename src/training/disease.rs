//! Disease classifier training.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{median, TrainingConfig, TrainingError, TrainingRecord};
use crate::ml::boosting::argmax;
use crate::ml::split::{accuracy, stratified_split};
use crate::ml::GradientBoostedClassifier;
use crate::models::{ReferralRecord, Sex};
use crate::pipeline::artifacts::{self, write_all_atomically};
use crate::pipeline::classifier::DiseaseMetadata;
use crate::pipeline::features::{build_features, sex_column, FeatureMetadata};
use crate::pipeline::text::token_set;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseTrainingReport {
    pub rows_used: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub classes: Vec<String>,
    pub dropped_classes: Vec<String>,
    pub vocabulary_size: usize,
    pub accuracy: f32,
}

/// Allow-listed rows, grouped by code, with singleton classes removed.
fn usable_rows<'a>(
    records: &'a [TrainingRecord],
    config: &TrainingConfig,
) -> (Vec<(&'a ReferralRecord, String)>, Vec<String>) {
    let mut by_code: BTreeMap<String, Vec<&ReferralRecord>> = BTreeMap::new();
    for record in records {
        let Some(code) = record.diagnosis_code.as_deref().map(str::trim) else {
            continue;
        };
        if config.allowed_codes.contains_key(code) {
            by_code.entry(code.to_string()).or_default().push(&record.referral);
        }
    }

    let mut rows = Vec::new();
    let mut dropped = Vec::new();
    for (code, group) in by_code {
        if group.len() < 2 {
            dropped.push(code);
            continue;
        }
        rows.extend(group.into_iter().map(|r| (r, code.clone())));
    }
    if !dropped.is_empty() {
        tracing::warn!(?dropped, "Classes with a single row cannot be stratified, dropped");
    }
    (rows, dropped)
}

/// Train the disease classifier and write its artifacts into `out_dir`.
///
/// Rows whose code is not allow-listed are ignored. Fewer than two usable
/// classes is an error and nothing is written.
pub fn train_disease_model(
    records: &[TrainingRecord],
    config: &TrainingConfig,
    out_dir: &Path,
) -> Result<DiseaseTrainingReport, TrainingError> {
    let (rows, dropped_classes) = usable_rows(records, config);
    if rows.is_empty() {
        return Err(TrainingError::InsufficientData(
            "no rows with an allow-listed diagnosis code".into(),
        ));
    }
    let classes: Vec<String> = rows
        .iter()
        .map(|(_, code)| code.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if classes.len() < 2 {
        return Err(TrainingError::NeedTwoClasses {
            found: classes.len(),
        });
    }

    let labels: Vec<usize> = rows
        .iter()
        .map(|(_, code)| classes.iter().position(|c| c == code).unwrap_or(0))
        .collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train, test) = stratified_split(&labels, config.test_fraction, &mut rng);

    // Vocabulary, sex columns and default age come from the training split only.
    let mut vocabulary = BTreeSet::new();
    let mut sexes = HashSet::new();
    let mut ages = Vec::new();
    for &i in &train {
        let referral = rows[i].0;
        vocabulary.extend(token_set(referral.clinical_text(), &config.fallback_token));
        sexes.insert(referral.patient.sex());
        ages.extend(referral.patient.age_years());
    }
    let sex_columns = [Sex::M, Sex::F, Sex::Unknown]
        .into_iter()
        .filter(|s| sexes.contains(s))
        .map(sex_column)
        .collect();
    let default_age = median(&ages).unwrap_or(config.fallback_age);

    let mut features = FeatureMetadata::new(vocabulary.into_iter().collect(), sex_columns, default_age);
    features.fallback_token = config.fallback_token.clone();

    let referrals: Vec<ReferralRecord> = rows.iter().map(|(r, _)| (*r).clone()).collect();
    let table = build_features(&referrals, &features);
    if table.is_empty() {
        return Err(TrainingError::InsufficientData(
            "no usable text in training rows".into(),
        ));
    }

    let pick = |idx: &[usize]| -> (Vec<Vec<f32>>, Vec<usize>) {
        idx.iter().map(|&i| (table.rows[i].clone(), labels[i])).unzip()
    };
    let (train_rows, train_labels) = pick(&train);
    let (test_rows, test_labels) = pick(&test);

    tracing::info!(
        rows = rows.len(),
        classes = classes.len(),
        vocabulary = features.vocabulary.len(),
        "Training disease classifier"
    );
    let model = GradientBoostedClassifier::fit(&train_rows, &train_labels, classes.clone(), &config.boosting);

    let predicted: Vec<usize> = test_rows
        .iter()
        .map(|row| argmax(&model.predict_proba(row)).unwrap_or(0))
        .collect();
    let held_out_accuracy = accuracy(&predicted, &test_labels);

    let metadata = DiseaseMetadata {
        allowed_codes: config.allowed_codes.keys().cloned().collect(),
        code_labels: config.allowed_codes.clone(),
        features,
        trained_at: Utc::now(),
    };
    let files = [
        (artifacts::CLASSIFIER_FILE, serde_json::to_string(&model)?),
        (artifacts::DISEASE_METADATA_FILE, serde_json::to_string_pretty(&metadata)?),
    ];
    write_all_atomically(out_dir, artifacts::DISEASE_GROUP, &files)?;

    let report = DiseaseTrainingReport {
        rows_used: rows.len(),
        train_rows: train.len(),
        test_rows: test.len(),
        classes,
        dropped_classes,
        vocabulary_size: metadata.features.vocabulary.len(),
        accuracy: held_out_accuracy,
    };
    tracing::info!(
        accuracy = report.accuracy,
        dir = %out_dir.display(),
        "Disease classifier written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;
    use crate::pipeline::artifacts::ArtifactPaths;
    use chrono::Utc;

    fn row(id: i64, text: &str, code: &str) -> TrainingRecord {
        TrainingRecord::new(
            ReferralRecord::new(id, Utc::now())
                .with_symptoms(text)
                .with_patient(Patient::new(30.0 + id as f64, if id % 2 == 0 { "F" } else { "M" })),
            Some(code),
        )
    }

    #[test]
    fn single_class_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<_> = (0..6).map(|i| row(i, "ubo", "J06.9")).collect();
        let err = train_disease_model(&records, &TrainingConfig::default(), dir.path()).unwrap_err();
        assert!(matches!(err, TrainingError::NeedTwoClasses { found: 1 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn no_allow_listed_rows_is_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![row(1, "sore eyes", "H10.9"), row(2, "", "N")];
        let err = train_disease_model(&records, &TrainingConfig::default(), dir.path()).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientData(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let err = train_disease_model(&[], &TrainingConfig::default(), dir.path()).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientData(_)));
    }

    #[test]
    fn singleton_classes_are_dropped() {
        let config = TrainingConfig::default();
        let records = vec![
            row(1, "ubo", "J06.9"),
            row(2, "ubo", "J06.9"),
            row(3, "lagnat", "R50.9"),
            row(4, "sugat", "Z00"),
        ];
        let (rows, dropped) = usable_rows(&records, &config);
        assert_eq!(rows.len(), 2);
        assert_eq!(dropped, vec!["R50.9"]);
    }

    #[test]
    fn trains_and_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(row(i, "ubo at sipon", "J06.9"));
            records.push(row(100 + i, "may sugat sa binti", "T14.1"));
        }
        let report = train_disease_model(&records, &TrainingConfig::default(), dir.path()).unwrap();
        assert_eq!(report.classes, vec!["J06.9", "T14.1"]);
        assert_eq!(report.rows_used, 20);
        assert_eq!(report.test_rows, 4);
        assert!(report.accuracy > 0.99);
        let current = ArtifactPaths::new(dir.path()).resolve(artifacts::DISEASE_GROUP).unwrap();
        assert!(current.join(artifacts::CLASSIFIER_FILE).exists());
        assert!(current.join(artifacts::DISEASE_METADATA_FILE).exists());
    }
}
