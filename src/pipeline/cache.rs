//! Prediction cache.
//!
//! The predictor only sees the `PredictionCache` trait (`get` / `set` with a
//! TTL). `InMemoryPredictionCache` is the in-process backend; entries are
//! replaced whole, never patched. Expired entries are dropped on read and
//! swept on every write, so the map stays bounded by the live key set.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::BatchPredictions;
use crate::models::ReferralRecord;

const KEY_PREFIX: &str = "disease_time_predictions";

/// Get/set store for whole batch results. Last write wins.
pub trait PredictionCache: Send + Sync {
    fn get(&self, key: &str) -> Option<BatchPredictions>;
    fn set(&self, key: &str, value: BatchPredictions, ttl: Duration);
}

// ═══════════════════════════════════════════════════════════
// Cache keys
// ═══════════════════════════════════════════════════════════

/// How a batch maps to a cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyStrategy {
    /// Key on the number of records only. Two different batches of the same
    /// size share an entry until it expires.
    #[default]
    BatchSize,
    /// Key on a digest of the sorted referral ids.
    RecordIds,
}

impl CacheKeyStrategy {
    pub fn key_for(self, records: &[ReferralRecord]) -> String {
        match self {
            CacheKeyStrategy::BatchSize => format!("{KEY_PREFIX}_{}", records.len()),
            CacheKeyStrategy::RecordIds => {
                let mut ids: Vec<i64> = records.iter().map(|r| r.id).collect();
                ids.sort_unstable();
                let mut hasher = Sha256::new();
                for id in ids {
                    hasher.update(id.to_le_bytes());
                }
                let digest: String = hasher
                    .finalize()
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect();
                format!("{KEY_PREFIX}_ids_{digest}")
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// InMemoryPredictionCache
// ═══════════════════════════════════════════════════════════

struct CacheEntry {
    value: BatchPredictions,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
pub struct InMemoryPredictionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

fn sweep(entries: &mut HashMap<String, CacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    before - entries.len()
}

impl InMemoryPredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let purged = sweep(&mut entries, Instant::now());
        if purged > 0 {
            tracing::debug!(purged, "Expired prediction cache entries removed");
        }
        purged
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl PredictionCache for InMemoryPredictionCache {
    fn get(&self, key: &str) -> Option<BatchPredictions> {
        let mut entries = self.entries.lock().ok()?;
        let now = Instant::now();
        if entries.get(key)?.is_live(now) {
            return entries.get(key).map(|entry| entry.value.clone());
        }
        entries.remove(key);
        None
    }

    fn set(&self, key: &str, value: BatchPredictions, ttl: Duration) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!("Prediction cache lock poisoned, result not stored");
            return;
        };
        let now = Instant::now();
        let swept = sweep(&mut entries, now);
        if swept > 0 {
            tracing::debug!(swept, "Expired prediction cache entries dropped on write");
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }
}
