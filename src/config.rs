use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::cache::CacheKeyStrategy;

/// Application-level constants
pub const APP_NAME: &str = "ReferralInsight";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env override for the artifact directory.
pub const MODELS_DIR_ENV: &str = "REFERRAL_MODELS_DIR";

/// Prediction results are memoized for five minutes.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Wound/injury code that gets the keyword override.
pub const WOUND_CODE: &str = "T14.1";

/// Confidence gates applied to classifier output
pub mod thresholds {
    /// Below this the prediction collapses to "Unspecified".
    pub const MIN_CONFIDENCE: f32 = 0.30;

    /// The wound code needs at least this much, plus a wound keyword.
    pub const WOUND_MIN_CONFIDENCE: f32 = 0.50;
}

/// English and local-language wound vocabulary.
pub const DEFAULT_WOUND_KEYWORDS: &[&str] = &[
    "wound", "cut", "laceration", "lacerated", "puncture", "punctured",
    "bleeding", "bleed", "abrasion", "gash", "stab", "incision",
    "sugat", "nasugatan", "hiwa", "nahiwa", "tusok", "natusok", "galos",
    "dugo", "dumudugo",
];

/// Diagnosis codes the classifier may surface, with dashboard labels.
pub const DEFAULT_ALLOWED_CODES: &[(&str, &str)] = &[
    ("A09", "Diarrhoea and gastroenteritis"),
    ("I10", "Essential (primary) hypertension"),
    ("J06.9", "Acute upper respiratory infection"),
    ("J18.9", "Pneumonia, unspecified organism"),
    ("R50.9", "Fever, unspecified"),
    ("R51", "Headache"),
    ("T14.1", "Open wound of unspecified body region"),
    ("W54", "Bitten or struck by dog"),
    ("W55", "Bitten or struck by other mammals"),
];

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "warn,referral_insight=info"
}

/// Get the application data directory
/// ~/ReferralInsight/ when a home directory exists, else the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory holding the trained artifacts.
pub fn models_dir() -> PathBuf {
    match std::env::var(MODELS_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => app_data_dir().join("models"),
    }
}

// ═══════════════════════════════════════════════════════════
// Vital-sign imputation
// ═══════════════════════════════════════════════════════════

/// Values used when a referral leaves a vital sign blank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalDefaults {
    pub weight_kg: f32,
    pub height_cm: f32,
    pub systolic_bp: f32,
    pub diastolic_bp: f32,
    pub pulse_rate: f32,
    pub respiratory_rate: f32,
    pub temperature_c: f32,
    pub oxygen_saturation: f32,
}

impl Default for VitalDefaults {
    fn default() -> Self {
        Self {
            weight_kg: 70.0,
            height_cm: 170.0,
            systolic_bp: 120.0,
            diastolic_bp: 80.0,
            pulse_rate: 72.0,
            respiratory_rate: 18.0,
            temperature_c: 37.0,
            oxygen_saturation: 98.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// PredictionConfig
// ═══════════════════════════════════════════════════════════

/// Online prediction settings, handed to the policy and predictor at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub min_confidence: f32,
    pub wound_code: String,
    pub wound_min_confidence: f32,
    pub wound_keywords: Vec<String>,
    pub vital_defaults: VitalDefaults,
    pub cache_ttl_secs: u64,
    pub cache_key: CacheKeyStrategy,
}

impl PredictionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_confidence: thresholds::MIN_CONFIDENCE,
            wound_code: WOUND_CODE.to_string(),
            wound_min_confidence: thresholds::WOUND_MIN_CONFIDENCE,
            wound_keywords: DEFAULT_WOUND_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            vital_defaults: VitalDefaults::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_key: CacheKeyStrategy::BatchSize,
        }
    }
}
