//! Time-to-cater regressor training.
//!
//! Target is completion minus creation, in hours. Referrals that were never
//! completed, finished before they were created, or carry unparseable
//! vitals are left out.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{TrainingConfig, TrainingError, TrainingRecord};
use crate::ml::split::{mean_absolute_error, r2_score, random_split};
use crate::ml::{GradientBoostedRegressor, TfidfVectorizer};
use crate::pipeline::artifacts::{self, write_all_atomically};
use crate::pipeline::regressor::RegressorArtifact;
use crate::pipeline::text::clean_tokens;

/// Fewest completed referrals worth fitting on.
const MIN_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTrainingReport {
    pub rows_used: usize,
    pub skipped: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub vocabulary_size: usize,
    pub mae_hours: f32,
    pub r2: f32,
}

struct Sample {
    vitals: [f32; 8],
    tokens: Vec<String>,
    hours: f32,
}

pub fn train_time_model(
    records: &[TrainingRecord],
    config: &TrainingConfig,
    out_dir: &Path,
) -> Result<TimeTrainingReport, TrainingError> {
    let mut samples = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for TrainingRecord { referral, .. } in records {
        let Some(hours) = referral.hours_to_complete().filter(|h| h.is_finite() && *h >= 0.0) else {
            skipped += 1;
            continue;
        };
        match referral.vitals.coerce(&config.vital_defaults) {
            Ok(vitals) => samples.push(Sample {
                vitals,
                tokens: clean_tokens(referral.clinical_text()),
                hours,
            }),
            Err((field, value)) => {
                tracing::debug!(referral_id = referral.id, field = field.as_str(), %value, "Skipping referral");
                skipped += 1;
            }
        }
    }
    if samples.len() < MIN_ROWS {
        return Err(TrainingError::InsufficientData(format!(
            "{} completed referrals with usable vitals, need {MIN_ROWS}",
            samples.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train, test) = random_split(samples.len(), config.test_fraction, &mut rng);

    let train_docs: Vec<Vec<String>> = train.iter().map(|&i| samples[i].tokens.clone()).collect();
    let vectorizer = TfidfVectorizer::fit(&train_docs, config.tfidf_max_features);

    let row = |s: &Sample| -> Vec<f32> {
        let mut row = s.vitals.to_vec();
        row.extend(vectorizer.transform(&s.tokens));
        row
    };
    let pick = |idx: &[usize]| -> (Vec<Vec<f32>>, Vec<f32>) {
        idx.iter().map(|&i| (row(&samples[i]), samples[i].hours)).unzip()
    };
    let (train_rows, train_targets) = pick(&train);
    let (test_rows, test_targets) = pick(&test);

    tracing::info!(
        rows = samples.len(),
        skipped,
        vocabulary = vectorizer.len(),
        "Training time regressor"
    );
    let model = GradientBoostedRegressor::fit(&train_rows, &train_targets, &config.boosting);
    let predicted: Vec<f32> = test_rows.iter().map(|r| model.predict_row(r)).collect();

    let artifact = RegressorArtifact::new(model, vectorizer);
    let files = [
        (artifacts::REGRESSOR_FILE, serde_json::to_string(&artifact.to_file())?),
        (artifacts::VECTORIZER_FILE, serde_json::to_string(&artifact.vectorizer)?),
    ];
    write_all_atomically(out_dir, artifacts::TIME_GROUP, &files)?;

    let report = TimeTrainingReport {
        rows_used: samples.len(),
        skipped,
        train_rows: train.len(),
        test_rows: test.len(),
        vocabulary_size: artifact.vectorizer.len(),
        mae_hours: mean_absolute_error(&predicted, &test_targets),
        r2: r2_score(&predicted, &test_targets),
    };
    tracing::info!(
        mae_hours = report.mae_hours,
        r2 = report.r2,
        dir = %out_dir.display(),
        "Time regressor written"
    );
    Ok(report)
}
