//! PID file management.
//!
//! Prevents two daemon instances from fighting over the same socket and
//! database. The file is created on startup and removed on drop.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

/// PID file guard. Removes the file when dropped.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates the PID file, failing if another live instance owns it.
    ///
    /// A PID file whose process is gone (or whose contents are garbage) is
    /// treated as stale and replaced.
    pub fn create(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();

        if path.exists() {
            match read_pid(&path) {
                Some(pid) if is_process_running(pid) => {
                    return Err(ServerError::already_running(path.to_string_lossy()));
                }
                other => {
                    warn!(path = %path.display(), stale_pid = ?other, "removing stale PID file");
                    fs::remove_file(&path)?;
                }
            }
        }

        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let pid = process::id();
        let mut file = File::create(&path)?;
        writeln!(file, "{pid}")?;
        file.sync_all()?;

        info!(path = %path.display(), pid, "created PID file");
        Ok(Self { path })
    }

    /// Returns the path to the PID file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
            } else {
                debug!(path = %self.path.display(), "removed PID file");
            }
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// Returns the default PID file path.
///
/// Uses `$XDG_RUNTIME_DIR/calshare.pid` if available, otherwise falls back
/// to `/tmp/calshare-$UID.pid`.
pub fn default_pid_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("calshare.pid")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/calshare-{}.pid", uid))
    }
}
