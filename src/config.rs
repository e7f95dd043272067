//! Engine configuration (C0, ambient): a thin runtime-facing struct
//! loaded from TOML, following the teacher's `Config`/`ForgeConfig`
//! split between a serializable settings struct and defaults applied
//! at load time.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{OrcError, OrcResult};
use crate::orphan::DEFAULT_STALE_THRESHOLD_MINUTES;

fn default_concurrency_limit() -> usize {
    4
}

fn default_idle_poll_interval_ms() -> u64 {
    2_000
}

fn default_orphan_stale_minutes() -> i64 {
    DEFAULT_STALE_THRESHOLD_MINUTES
}

fn default_pid_file_name() -> String {
    crate::guard::DEFAULT_PID_FILE_NAME.to_string()
}

fn default_sequence_file() -> PathBuf {
    PathBuf::from(".orc/sequences.json")
}

/// Where worktrees and PID files live when no explicit root is given:
/// `~/.orc`, falling back to `.orc` under the current directory if the
/// home directory can't be determined.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".orc"))
        .unwrap_or_else(|| PathBuf::from(".orc"))
}

/// Runtime settings for the engine: concurrency, polling cadence,
/// orphan-detection thresholds, and on-disk file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub concurrency_limit: usize,
    pub idle_poll_interval_ms: u64,
    pub orphan_stale_minutes: i64,
    pub pid_file_name: String,
    pub sequence_file: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
            orphan_stale_minutes: default_orphan_stale_minutes(),
            pid_file_name: default_pid_file_name(),
            sequence_file: default_sequence_file(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults for any field
    /// the file omits. Missing file yields plain defaults.
    pub fn load(path: impl AsRef<Path>) -> OrcResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|err| OrcError::config(err.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(OrcError::persistence(err)),
        }
    }

    pub fn idle_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.concurrency_limit, 4);
    }

    #[test]
    fn partial_file_fills_in_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orc.toml");
        fs::write(&path, "concurrency_limit = 8\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.orphan_stale_minutes, DEFAULT_STALE_THRESHOLD_MINUTES);
    }

    #[test]
    fn default_root_is_non_empty() {
        assert!(!default_root().as_os_str().is_empty());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orc.toml");
        fs::write(&path, "not valid toml =====").unwrap();
        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, OrcError::ConfigError(_)));
    }
}
