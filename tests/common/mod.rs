//! Hand-assembled artifacts with known outputs.
//!
//! Classifier columns: txt:cough, txt:diarrhea, txt:fever, txt:leg, txt:wound,
//! sex:F, sex:M, age. One boosting round, learning rate 1, zero base scores:
//! - a cough / diarrhea / fever token scores its class 3.0 (p ≈ 0.87)
//! - wound scores T14.1 1.994 (p ≈ 0.71), leg alone 1.504 (p ≈ 0.60)
//! - no known token leaves a uniform 0.25 across the four classes
//!
//! Regressor: constant 2.0 hours.

#![allow(dead_code)]

use std::path::Path;

use chrono::{TimeZone, Utc};

use referral_insight::ml::{
    GradientBoostedClassifier, GradientBoostedRegressor, RegressionTree, TfidfVectorizer, TreeNode,
};
use referral_insight::models::{Patient, ReferralRecord};
use referral_insight::pipeline::artifacts::{self, write_all_atomically};
use referral_insight::pipeline::features::FeatureMetadata;
use referral_insight::pipeline::regressor::RegressorArtifact;
use referral_insight::pipeline::DiseaseMetadata;

pub const CLASSES: [&str; 4] = ["A09", "J06.9", "R50.9", "T14.1"];

fn on_token(feature: usize, value: f32) -> RegressionTree {
    RegressionTree::from_nodes(vec![
        TreeNode::Split { feature, threshold: 0.5, left: 1, right: 2 },
        TreeNode::Leaf { value: 0.0 },
        TreeNode::Leaf { value },
    ])
}

pub fn classifier_model() -> GradientBoostedClassifier {
    let wound = RegressionTree::from_nodes(vec![
        TreeNode::Split { feature: 4, threshold: 0.5, left: 1, right: 4 },
        TreeNode::Split { feature: 3, threshold: 0.5, left: 2, right: 3 },
        TreeNode::Leaf { value: 0.0 },
        TreeNode::Leaf { value: 1.504 },
        TreeNode::Leaf { value: 1.994 },
    ]);
    GradientBoostedClassifier::new(
        CLASSES.iter().map(|c| c.to_string()).collect(),
        vec![0.0; 4],
        1.0,
        vec![vec![on_token(1, 3.0), on_token(0, 3.0), on_token(2, 3.0), wound]],
        8,
    )
}

pub fn disease_metadata() -> DiseaseMetadata {
    let vocabulary = ["cough", "diarrhea", "fever", "leg", "wound"]
        .iter()
        .map(|t| t.to_string())
        .collect();
    DiseaseMetadata {
        features: FeatureMetadata::new(vocabulary, vec!["sex:F".into(), "sex:M".into()], 30.0),
        allowed_codes: CLASSES.iter().map(|c| c.to_string()).collect(),
        code_labels: [("T14.1".to_string(), "Open wound".to_string())].into(),
        trained_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn regressor_artifact(hours: f32) -> RegressorArtifact {
    let vectorizer = TfidfVectorizer::fit(&[], 10);
    RegressorArtifact::new(GradientBoostedRegressor::new(hours, 1.0, vec![], 8), vectorizer)
}

pub fn write_classifier(dir: &Path) {
    write_all_atomically(
        dir,
        artifacts::DISEASE_GROUP,
        &[
            (artifacts::CLASSIFIER_FILE, serde_json::to_string(&classifier_model()).unwrap()),
            (artifacts::DISEASE_METADATA_FILE, serde_json::to_string(&disease_metadata()).unwrap()),
        ],
    )
    .unwrap();
}

pub fn write_regressor(dir: &Path, hours: f32) {
    let artifact = regressor_artifact(hours);
    write_all_atomically(
        dir,
        artifacts::TIME_GROUP,
        &[
            (artifacts::REGRESSOR_FILE, serde_json::to_string(&artifact.to_file()).unwrap()),
            (artifacts::VECTORIZER_FILE, serde_json::to_string(&artifact.vectorizer).unwrap()),
        ],
    )
    .unwrap();
}

/// Tempdir with both models written.
pub fn models_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_classifier(dir.path());
    write_regressor(dir.path(), 2.0);
    dir
}

pub fn referral(id: i64, symptoms: &str) -> ReferralRecord {
    ReferralRecord::new(id, Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap())
        .with_symptoms(symptoms)
        .with_patient(Patient::new(34.0, "Female"))
}
