//! Crash-safe persistence for the state snapshot.
//!
//! All mutation goes through `mutate`, serialized by one mutex with short
//! critical sections. `persist` serializes a clone outside the lock and
//! replaces state.toml atomically (temp file + rename), so a crash mid-write
//! never leaves a partially-written file in the canonical location.

use anyhow::{Context, Result};
use hive_core::HivemindError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

use crate::snapshot::{CURRENT_SCHEMA_VERSION, StateSnapshot};

pub const STATE_FILE_NAME: &str = "state.toml";

pub struct StateStore {
    state_path: PathBuf,
    inner: Mutex<StateSnapshot>,
}

impl StateStore {
    /// Open the store for `state_dir`, recovering a persisted snapshot when
    /// one exists.
    ///
    /// A missing file is a first run and yields defaults silently. An
    /// unreadable or schema-mismatched file is a degradation, not a fatal
    /// error: it is logged and replaced with defaults, and the process keeps
    /// going.
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;
        let state_path = state_dir.join(STATE_FILE_NAME);

        let snapshot = if state_path.exists() {
            match load(&state_path) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(
                        path = %state_path.display(),
                        error = %err,
                        "state file unusable, starting from defaults"
                    );
                    StateSnapshot::default()
                }
            }
        } else {
            StateSnapshot::default()
        };

        Ok(Self {
            state_path,
            inner: Mutex::new(snapshot),
        })
    }

    /// Apply a mutation under exclusive access. No two mutations interleave.
    ///
    /// The closure must not block or perform I/O.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut StateSnapshot) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Immutable copy for read-only consumers. Does not hold the mutation
    /// lock beyond the clone.
    pub fn snapshot(&self) -> StateSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write the current snapshot durably.
    pub fn persist(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let contents =
            toml::to_string_pretty(&snapshot).context("Failed to serialize state snapshot")?;

        let dir = self
            .state_path
            .parent()
            .context("state path has no parent directory")?;

        // Temp file in the same directory so the rename stays on one
        // filesystem and is atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp state file in {}", dir.display()))?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write temp state file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync temp state file")?;
        tmp.persist(&self.state_path).with_context(|| {
            format!("Failed to replace state file: {}", self.state_path.display())
        })?;

        Ok(())
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

/// Load and verify a persisted snapshot.
///
/// Exposed for read-only consumers (the `status` command) that must not
/// silently fall back to defaults.
pub fn load(state_path: &Path) -> Result<StateSnapshot, HivemindError> {
    let contents =
        std::fs::read_to_string(state_path).map_err(|e| HivemindError::StateCorrupted {
            path: state_path.display().to_string(),
            reason: e.to_string(),
        })?;

    let snapshot: StateSnapshot =
        toml::from_str(&contents).map_err(|e| HivemindError::StateCorrupted {
            path: state_path.display().to_string(),
            reason: e.to_string(),
        })?;

    if snapshot.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(HivemindError::SchemaMismatch {
            found: snapshot.schema_version,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }

    Ok(snapshot)
}
