//! Feature builder: referral text + patient attributes → model-aligned table.
//!
//! Columns are named so the three feature families cannot collide:
//! `txt:<token>` for vocabulary tokens, `sex:<M|F|Unknown>`, and `age`.
//! The artifact's `feature_columns` is the single source of truth for order;
//! derived columns it does not list are dropped, listed columns nothing
//! derives stay zero.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::text;
use crate::models::{ReferralId, ReferralRecord, Sex};

pub const AGE_COLUMN: &str = "age";

/// Ages are divided by this before entering the table.
pub const AGE_SCALE: f32 = 100.0;

pub fn token_column(token: &str) -> String {
    format!("txt:{token}")
}

pub fn sex_column(sex: Sex) -> String {
    format!("sex:{}", sex.as_str())
}

/// Everything the online builder needs, recorded at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub vocabulary: Vec<String>,
    pub sex_columns: Vec<String>,
    pub feature_columns: Vec<String>,
    pub fallback_token: String,
    pub default_age: f32,
}

impl FeatureMetadata {
    /// Standard column order: vocabulary, then sex columns, then age.
    pub fn new(vocabulary: Vec<String>, sex_columns: Vec<String>, default_age: f32) -> Self {
        let feature_columns = vocabulary
            .iter()
            .map(|t| token_column(t))
            .chain(sex_columns.iter().cloned())
            .chain(std::iter::once(AGE_COLUMN.to_string()))
            .collect();
        Self {
            vocabulary,
            sex_columns,
            feature_columns,
            fallback_token: text::NO_SYMPTOM_TOKEN.to_string(),
            default_age,
        }
    }
}

/// Rows = records (in input order), columns = artifact feature columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub ids: Vec<ReferralId>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f32>>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f32> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }
}

/// Derived (column, value) pairs for one record, before alignment.
fn derive_columns(
    record: &ReferralRecord,
    meta: &FeatureMetadata,
    vocabulary: &HashSet<&str>,
) -> Vec<(String, f32)> {
    let mut derived: Vec<(String, f32)> = text::token_set(record.clinical_text(), &meta.fallback_token)
        .into_iter()
        .filter(|t| vocabulary.contains(t.as_str()))
        .map(|t| (token_column(&t), 1.0))
        .collect();

    let sex = sex_column(record.patient.sex());
    if meta.sex_columns.contains(&sex) {
        derived.push((sex, 1.0));
    }

    let age = record.patient.age_years().unwrap_or(meta.default_age);
    derived.push((AGE_COLUMN.to_string(), age / AGE_SCALE));
    derived
}

/// Vectorize a batch against an artifact's metadata.
///
/// An artifact without a vocabulary produces an empty table, which callers
/// treat as "cannot predict". An empty batch produces a column-aligned table
/// with no rows.
pub fn build_features(records: &[ReferralRecord], meta: &FeatureMetadata) -> FeatureTable {
    if meta.vocabulary.is_empty() || meta.feature_columns.is_empty() {
        tracing::warn!("Feature metadata has no vocabulary, cannot vectorize");
        return FeatureTable::default();
    }

    let index: HashMap<&str, usize> = meta
        .feature_columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let vocabulary: HashSet<&str> = meta.vocabulary.iter().map(String::as_str).collect();

    let mut table = FeatureTable {
        ids: Vec::with_capacity(records.len()),
        columns: meta.feature_columns.clone(),
        rows: Vec::with_capacity(records.len()),
    };

    for record in records {
        let mut row = vec![0.0f32; meta.feature_columns.len()];
        for (column, value) in derive_columns(record, meta, &vocabulary) {
            if let Some(&i) = index.get(column.as_str()) {
                row[i] = value;
            }
        }
        table.ids.push(record.id);
        table.rows.push(row);
    }

    table
}
