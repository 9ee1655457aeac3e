//! Artifact files on disk and the in-process slot that holds them.
//!
//! Well-known file names, in two groups that are trained separately:
//! - `disease`: `disease_classifier.json` (boosted classifier) and
//!   `disease_metadata.json` (vocabulary, columns, allow-list, labels)
//! - `time`: `time_regressor.json` (boosted regressor) and
//!   `time_vectorizer.json` (TF-IDF vectorizer paired with it)
//!
//! Each write lands a whole group in a fresh generation directory
//! (`<models>/disease-<stamp>/`) and then repoints `<models>/disease.current`
//! with a single rename. Readers resolve the pointer once per load, so they
//! see either the previous group or the new one, never a mix. A models
//! directory without a pointer is read flat.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use super::PredictionError;

pub const CLASSIFIER_FILE: &str = "disease_classifier.json";
pub const DISEASE_METADATA_FILE: &str = "disease_metadata.json";
pub const REGRESSOR_FILE: &str = "time_regressor.json";
pub const VECTORIZER_FILE: &str = "time_vectorizer.json";

pub const DISEASE_GROUP: &str = "disease";
pub const TIME_GROUP: &str = "time";

const POINTER_SUFFIX: &str = ".current";

/// Read and parse one artifact file.
///
/// A missing file is `ModelUnavailable`; anything else that goes wrong is
/// `ArtifactLoad`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PredictionError> {
    if !path.exists() {
        return Err(PredictionError::ModelUnavailable(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| PredictionError::ArtifactLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| PredictionError::ArtifactLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn pointer_path(dir: &Path, group: &str) -> PathBuf {
    dir.join(format!("{group}{POINTER_SUFFIX}"))
}

/// Generation directory name the group pointer currently holds, if any.
fn current_generation(dir: &Path, group: &str) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(pointer_path(dir, group)) {
        Ok(raw) => Ok(Some(raw.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// A generation name must be a single plain path component.
fn is_generation_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn stage_files(generation_dir: &Path, files: &[(&str, String)]) -> std::io::Result<()> {
    for (name, contents) in files {
        let mut file = File::create(generation_dir.join(name))?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    Ok(())
}

fn repoint(dir: &Path, group: &str, generation: &str) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(generation.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(pointer_path(dir, group)).map_err(|e| e.error)?;
    Ok(())
}

/// Write one artifact group so that either all of its files become current
/// or none do.
///
/// Files go into a new generation directory; the group pointer is switched
/// only after every file is written and synced. On failure the new
/// generation is removed and the pointer is left untouched. The previous
/// generation is removed after a successful switch. Returns the new
/// generation directory.
pub fn write_all_atomically(
    dir: &Path,
    group: &str,
    files: &[(&str, String)],
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let previous = current_generation(dir, group)?;

    let generation = format!(
        "{group}-{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%S%6f"),
        rand::random::<u32>()
    );
    let generation_dir = dir.join(&generation);
    std::fs::create_dir(&generation_dir)?;

    let committed =
        stage_files(&generation_dir, files).and_then(|()| repoint(dir, group, &generation));
    if let Err(e) = committed {
        if let Err(cleanup) = std::fs::remove_dir_all(&generation_dir) {
            tracing::warn!(
                dir = %generation_dir.display(),
                error = %cleanup,
                "Failed to remove abandoned generation"
            );
        }
        return Err(e);
    }

    if let Some(old) = previous.filter(|old| is_generation_name(old) && *old != generation) {
        let old_dir = dir.join(old);
        if let Err(e) = std::fs::remove_dir_all(&old_dir) {
            tracing::warn!(
                dir = %old_dir.display(),
                error = %e,
                "Failed to remove previous generation"
            );
        }
    }
    tracing::debug!(group, generation = %generation, "Artifact generation committed");
    Ok(generation_dir)
}

// ═══════════════════════════════════════════════════════════
// ArtifactSlot — lazy load + atomic swap
// ═══════════════════════════════════════════════════════════

/// An artifact plus the moment it was loaded into this process.
#[derive(Debug)]
pub struct Loaded<T> {
    pub artifact: T,
    pub loaded_at: DateTime<Utc>,
}

/// Process-wide holder for one loaded artifact.
///
/// Readers clone the inner `Arc` and keep using it for the whole batch, so a
/// concurrent `swap` never exposes a half-loaded model.
#[derive(Debug)]
pub struct ArtifactSlot<T> {
    current: RwLock<Option<Arc<Loaded<T>>>>,
}

impl<T> ArtifactSlot<T> {
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn with(artifact: T) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(Loaded {
                artifact,
                loaded_at: Utc::now(),
            }))),
        }
    }

    pub fn current(&self) -> Result<Option<Arc<Loaded<T>>>, PredictionError> {
        let guard = self.current.read().map_err(|_| PredictionError::LockPoisoned)?;
        Ok(guard.clone())
    }

    /// Return the loaded artifact, running `load` on first use.
    ///
    /// `load` runs without holding the lock. If two callers race on first
    /// use, the first one to finish wins and the other result is discarded.
    pub fn get_or_load<F>(&self, load: F) -> Result<Arc<Loaded<T>>, PredictionError>
    where
        F: FnOnce() -> Result<T, PredictionError>,
    {
        if let Some(loaded) = self.current()? {
            return Ok(loaded);
        }
        let fresh = Arc::new(Loaded {
            artifact: load()?,
            loaded_at: Utc::now(),
        });
        let mut guard = self.current.write().map_err(|_| PredictionError::LockPoisoned)?;
        Ok(guard.get_or_insert(fresh).clone())
    }

    /// Replace the held artifact. The new one must already be fully built.
    pub fn swap(&self, artifact: T) -> Result<Arc<Loaded<T>>, PredictionError> {
        let fresh = Arc::new(Loaded {
            artifact,
            loaded_at: Utc::now(),
        });
        let mut guard = self.current.write().map_err(|_| PredictionError::LockPoisoned)?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }
}

/// Locates artifact groups under one models directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The group's pointer file.
    pub fn pointer(&self, group: &str) -> PathBuf {
        pointer_path(&self.dir, group)
    }

    /// Directory holding the group's current files. Resolve once per load
    /// and read every file of the group from the returned directory.
    pub fn resolve(&self, group: &str) -> Result<PathBuf, PredictionError> {
        let invalid = |reason: String| PredictionError::ArtifactLoad {
            path: self.pointer(group),
            reason,
        };
        match current_generation(&self.dir, group) {
            Ok(Some(name)) if is_generation_name(&name) => Ok(self.dir.join(name)),
            Ok(Some(name)) => Err(invalid(format!("invalid generation name {name:?}"))),
            Ok(None) => Ok(self.dir.clone()),
            Err(e) => Err(invalid(e.to_string())),
        }
    }
}
