//! Online prediction pipeline.
//!
//! ```text
//! records → text/features → classifier ─┐
//!         → regressor ──────────────────┼→ policy → predictor ⇄ cache
//! ```
//!
//! Services return `Result<_, PredictionError>`; only the batch predictor
//! turns failures into sentinel values.

pub mod artifacts;
pub mod cache;
pub mod classifier;
pub mod features;
pub mod policy;
pub mod predictor;
pub mod regressor;
pub mod text;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ReferralId;

pub use cache::{CacheKeyStrategy, InMemoryPredictionCache, PredictionCache};
pub use classifier::{ClassifierArtifact, ClassifierOutput, DiseaseClassifierService, DiseaseMetadata};
pub use features::{build_features, FeatureMetadata, FeatureTable};
pub use policy::ConfidencePolicy;
pub use predictor::BatchPredictor;
pub use regressor::{RegressorArtifact, TimeRegressorService};
pub use types::{BatchPredictions, CateringTime, DiseaseLabel, ReferralPrediction};

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Model artifact not found: {0}")]
    ModelUnavailable(PathBuf),

    #[error("Failed to load artifact {path}: {reason}")]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Feature build failed: {0}")]
    FeatureBuild(String),

    #[error("Referral {referral_id}: {field} is not numeric ({value:?})")]
    VitalParse {
        referral_id: ReferralId,
        field: &'static str,
        value: String,
    },

    #[error("Feature table has {actual} columns, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Internal lock error")]
    LockPoisoned,
}
