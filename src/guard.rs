//! Process Guard (C3): a per-worktree exclusive lock backed by a PID
//! file, with stale-holder detection. At most one live process may hold
//! the guard for a given worktree at a time (invariant §3-10).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{OrcError, OrcResult};

/// Default PID file name, also the default `EngineConfig::pid_file_name`.
pub const DEFAULT_PID_FILE_NAME: &str = ".orc.pid";

/// Test whether `pid` refers to a live process by sending signal 0.
/// PID ≤ 0 is always "not alive", matching the spec's explicit edge
/// case and sidestepping `kill`'s process-group semantics for
/// non-positive values.
fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs no action beyond existence/permission
    // checks; it never affects process state.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Bound to an absolute worktree path; owns the lifecycle of that
/// worktree's PID file.
pub struct ProcessGuard {
    worktree: PathBuf,
    pid_file_name: String,
    held: bool,
}

impl ProcessGuard {
    /// `pid_file_name` is normally `EngineConfig::pid_file_name`, passed
    /// in by the caller rather than hardcoded here.
    pub fn new(worktree: impl Into<PathBuf>, pid_file_name: impl Into<String>) -> Self {
        Self {
            worktree: worktree.into(),
            pid_file_name: pid_file_name.into(),
            held: false,
        }
    }

    fn pid_file(&self) -> PathBuf {
        self.worktree.join(&self.pid_file_name)
    }

    /// Reports whether the worktree is already held by a live process,
    /// cleaning up a stale PID file if one is found.
    pub fn check(&self) -> OrcResult<()> {
        let path = self.pid_file();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(OrcError::persistence(err)),
        };

        match contents.trim().parse::<i32>() {
            Ok(pid) if is_alive(pid) => Err(OrcError::AlreadyRunning { pid }),
            _ => {
                debug!(path = %path.display(), "removing stale pid file");
                fs::remove_file(&path).or_else(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        Ok(())
                    } else {
                        Err(OrcError::persistence(err))
                    }
                })?;
                Ok(())
            }
        }
    }

    /// Creates the worktree directory if needed and writes the current
    /// process's PID atomically. Fails the same way as [`check`] if a
    /// live holder already exists.
    pub fn acquire(&mut self) -> OrcResult<()> {
        self.check()?;
        fs::create_dir_all(&self.worktree).map_err(OrcError::persistence)?;

        let pid = std::process::id();
        let path = self.pid_file();
        let tmp_path = path.with_extension("pid.tmp");
        fs::write(&tmp_path, pid.to_string()).map_err(OrcError::persistence)?;
        fs::rename(&tmp_path, &path).map_err(OrcError::persistence)?;

        self.held = true;
        info!(worktree = %self.worktree.display(), pid, "process guard acquired");
        Ok(())
    }

    /// Removes the PID file if present. Idempotent; safe to call from
    /// any exit path, including after a panic unwind.
    pub fn release(&mut self) {
        let path = self.pid_file();
        match fs::remove_file(&path) {
            Ok(()) => info!(worktree = %self.worktree.display(), "process guard released"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(worktree = %self.worktree.display(), %err, "failed to release process guard"),
        }
        self.held = false;
    }

    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if self.held {
            self.release();
        }
    }
}
