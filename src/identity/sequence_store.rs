//! Durable per-prefix sequence counters, written atomically via a
//! temp-file-plus-rename, matching the teacher's `PhasesFile` JSON-on-disk
//! convention.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::{OrcError, OrcResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SequenceFile {
    prefixes: HashMap<String, u64>,
}

/// Normalize a raw prefix into its storage key: uppercase, empty maps
/// to `_solo`.
pub fn normalize_key(prefix: &str) -> String {
    if prefix.is_empty() {
        "_solo".to_string()
    } else {
        prefix.to_uppercase()
    }
}

/// A single durable mapping from normalized prefix key to last-issued
/// integer. All operations are serialized under an internal mutex; the
/// backing file is replaced atomically on every mutation.
pub struct SequenceStore {
    path: PathBuf,
    state: Mutex<SequenceFile>,
}

impl SequenceStore {
    /// Load an existing store from `path`, or start empty if the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> OrcResult<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(OrcError::persistence)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => SequenceFile::default(),
            Err(err) => return Err(OrcError::persistence(err)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &SequenceFile) -> OrcResult<()> {
        let serialized = serde_json::to_string_pretty(state).map_err(OrcError::persistence)?;
        atomic_write(&self.path, &serialized)
    }

    /// Current value for `prefix`, or 0 if never issued.
    pub fn get(&self, prefix: &str) -> u64 {
        let key = normalize_key(prefix);
        let state = self.state.lock().expect("sequence store mutex poisoned");
        *state.prefixes.get(&key).unwrap_or(&0)
    }

    /// Increment then persist before returning.
    pub fn next(&self, prefix: &str) -> OrcResult<u64> {
        let key = normalize_key(prefix);
        let mut state = self.state.lock().expect("sequence store mutex poisoned");
        let next_value = state.prefixes.get(&key).copied().unwrap_or(0) + 1;
        state.prefixes.insert(key, next_value);
        self.persist(&state)?;
        Ok(next_value)
    }

    /// Force the counter for `prefix` to `n`, for catching up with an
    /// externally synced task set. No-op if `n` is not greater than the
    /// current value.
    pub fn set(&self, prefix: &str, n: u64) -> OrcResult<()> {
        let key = normalize_key(prefix);
        let mut state = self.state.lock().expect("sequence store mutex poisoned");
        let current = state.prefixes.get(&key).copied().unwrap_or(0);
        if n <= current {
            return Ok(());
        }
        state.prefixes.insert(key, n);
        self.persist(&state)
    }
}

fn atomic_write(path: &Path, contents: &str) -> OrcResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(OrcError::persistence)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).map_err(OrcError::persistence)?;
    fs::rename(&tmp_path, path).map_err(OrcError::persistence)?;
    Ok(())
}
