// crates/furlong-core/src/runtime/run_store.rs
// ============================================================================
// Module: Furlong Engine-Run Stores
// Description: In-memory and filesystem stores for engine-run records.
// Purpose: Persist canonical run records with retry on transient failures.
// Dependencies: crate::core, crate::interfaces, std::fs
// ============================================================================

//! ## Overview
//! Two [`EngineRunStore`] implementations: an in-memory store for tests and
//! a filesystem store writing `{engine_run_id}.json` in canonical form.
//! Listing is ordered by modification time, most recent first. Transient
//! write failures are retried up to three times with exponential backoff;
//! prior stages' in-memory artifacts survive a final failure for later
//! retry by the host.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::SystemTime;

use crate::core::engine_run::EngineRun;
use crate::core::identifiers::EngineRunId;
use crate::interfaces::EngineRunStore;
use crate::interfaces::RunStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Write attempts before a transient failure becomes terminal.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Base backoff between write attempts in milliseconds.
const BACKOFF_BASE_MS: u64 = 50;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory engine-run store for tests and dry runs.
///
/// # Invariants
/// - Insertion order is preserved for listing (most recent first).
#[derive(Debug, Default)]
pub struct InMemoryEngineRunStore {
    /// Stored runs plus insertion order.
    inner: Mutex<MemoryInner>,
}

/// Interior state of the in-memory store.
#[derive(Debug, Default)]
struct MemoryInner {
    /// Runs keyed by identifier.
    runs: BTreeMap<EngineRunId, EngineRun>,
    /// Identifiers in insertion order, oldest first.
    order: Vec<EngineRunId>,
}

impl InMemoryEngineRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored runs.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Io`] when the store lock is poisoned.
    pub fn len(&self) -> Result<usize, RunStoreError> {
        Ok(self.lock()?.runs.len())
    }

    /// Returns whether the store is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Io`] when the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, RunStoreError> {
        Ok(self.lock()?.runs.is_empty())
    }

    /// Locks the interior state.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, RunStoreError> {
        self.inner
            .lock()
            .map_err(|_| RunStoreError::Io("engine run store lock poisoned".to_string()))
    }
}

impl EngineRunStore for InMemoryEngineRunStore {
    fn save(&self, run: &EngineRun) -> Result<String, RunStoreError> {
        let mut inner = self.lock()?;
        let id = run.engine_run_id.clone();
        if !inner.runs.contains_key(&id) {
            inner.order.push(id.clone());
        }
        inner.runs.insert(id.clone(), run.clone());
        Ok(format!("memory://{id}"))
    }

    fn load(&self, engine_run_id: &EngineRunId) -> Result<Option<EngineRun>, RunStoreError> {
        Ok(self.lock()?.runs.get(engine_run_id).cloned())
    }

    fn list(&self, limit: usize) -> Result<Vec<EngineRunId>, RunStoreError> {
        let inner = self.lock()?;
        Ok(inner.order.iter().rev().take(limit).cloned().collect())
    }
}

// ============================================================================
// SECTION: Filesystem Store
// ============================================================================

/// Filesystem engine-run store writing one canonical JSON file per run.
///
/// # Invariants
/// - File names are `{engine_run_id}.json` inside the configured directory.
/// - Contents are canonical JSON; a saved run loads back byte-identical.
#[derive(Debug, Clone)]
pub struct FsEngineRunStore {
    /// Storage directory.
    dir: PathBuf,
}

impl FsEngineRunStore {
    /// Creates a store rooted at the given directory, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Io`] when the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RunStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|err| RunStoreError::Io(format!("create {}: {err}", dir.display())))?;
        Ok(Self {
            dir,
        })
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path for a run identifier.
    fn path_for(&self, engine_run_id: &EngineRunId) -> PathBuf {
        self.dir.join(format!("{engine_run_id}.json"))
    }

    /// Writes bytes with bounded retry and exponential backoff.
    fn write_with_retry(&self, path: &Path, bytes: &[u8]) -> Result<(), RunStoreError> {
        let mut last_error = String::new();
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            match fs::write(path, bytes) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last_error = err.to_string();
                    if attempt + 1 < MAX_WRITE_ATTEMPTS {
                        thread::sleep(Duration::from_millis(BACKOFF_BASE_MS << attempt));
                    }
                }
            }
        }
        Err(RunStoreError::Transient(format!(
            "write {} failed after {MAX_WRITE_ATTEMPTS} attempts: {last_error}",
            path.display()
        )))
    }
}

impl EngineRunStore for FsEngineRunStore {
    fn save(&self, run: &EngineRun) -> Result<String, RunStoreError> {
        let bytes = run
            .canonical_bytes()
            .map_err(|err| RunStoreError::Io(err.to_string()))?;
        let path = self.path_for(&run.engine_run_id);
        self.write_with_retry(&path, &bytes)?;
        Ok(path.display().to_string())
    }

    fn load(&self, engine_run_id: &EngineRunId) -> Result<Option<EngineRun>, RunStoreError> {
        let path = self.path_for(engine_run_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RunStoreError::Io(format!("read {}: {err}", path.display())));
            }
        };
        let value: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|err| RunStoreError::Corrupt(format!("{}: {err}", path.display())))?;
        EngineRun::from_value(value)
            .map(Some)
            .map_err(|err| RunStoreError::Corrupt(format!("{}: {err}", path.display())))
    }

    fn list(&self, limit: usize) -> Result<Vec<EngineRunId>, RunStoreError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| RunStoreError::Io(format!("list {}: {err}", self.dir.display())))?;

        let mut runs: Vec<(SystemTime, EngineRunId)> = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|err| RunStoreError::Io(format!("list entry: {err}")))?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            runs.push((modified, EngineRunId::new(stem)));
        }

        // Most recent first; equal mtimes fall back to id ordering so the
        // listing stays deterministic on coarse-grained filesystems.
        runs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(runs.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
