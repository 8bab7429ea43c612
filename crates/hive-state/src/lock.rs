//! Single-instance lock on the state directory, via `flock(2)` directly.
//!
//! Two daemons sharing a state directory would interleave snapshot writes,
//! so `run` takes an exclusive advisory lock before touching state. Raw
//! `libc::flock` is used instead of an RAII wrapper crate: owning the `File`
//! (which owns the fd) is enough, and `Drop` releases with `LOCK_UN`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hive_core::HivemindError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = "hivemind.lock";

/// Diagnostic information written to the lock file
#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    agent: String,
    acquired_at: DateTime<Utc>,
}

/// Guard for the exclusive state-directory lock.
///
/// The advisory lock lives on the fd of the open `file`; dropping the guard
/// issues `LOCK_UN` so release does not wait for the fd to close.
pub struct StateLock {
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for StateLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: the fd comes from `self.file`, which is still open here;
        // unlocking it touches no memory. Should the syscall fail, the
        // kernel drops the lock anyway once the fd closes.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl StateLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Acquire a non-blocking exclusive lock on `state_dir`.
///
/// On success the lock file carries a JSON diagnostic (pid, agent name,
/// acquisition time). On contention, the holder's diagnostic is read back
/// and the error carries [`HivemindError::StateLocked`] with its pid.
pub fn acquire_state_lock(state_dir: &Path, agent: &str) -> Result<StateLock> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create state directory: {}", state_dir.display()))?;

    let lock_path = state_dir.join(LOCK_FILE_NAME);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    let fd = file.as_raw_fd();

    // SAFETY: the fd belongs to the file opened above and stays open for
    // the duration of this call. LOCK_EX | LOCK_NB asks for an exclusive
    // lock without blocking; contention is handled via the return code.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

    if ret == 0 {
        let mut lock = StateLock { file, lock_path };

        let diagnostic = LockDiagnostic {
            pid: std::process::id(),
            agent: agent.to_string(),
            acquired_at: Utc::now(),
        };
        let json =
            serde_json::to_string(&diagnostic).context("Failed to serialize lock diagnostic")?;

        lock.file
            .set_len(0)
            .context("Failed to truncate lock file")?;
        lock.file
            .write_all(json.as_bytes())
            .context("Failed to write lock diagnostic")?;
        lock.file.flush().context("Failed to flush lock file")?;

        Ok(lock)
    } else {
        let mut diag_file =
            File::open(&lock_path).context("Failed to open lock file to read diagnostic")?;
        let mut contents = String::new();
        diag_file
            .read_to_string(&mut contents)
            .context("Failed to read lock file")?;

        match serde_json::from_str::<LockDiagnostic>(&contents) {
            Ok(diagnostic) => Err(anyhow::Error::new(HivemindError::StateLocked(diagnostic.pid))
                .context(format!(
                    "held by agent '{}' since {}",
                    diagnostic.agent, diagnostic.acquired_at
                ))),
            Err(_) => Err(anyhow::anyhow!(
                "State directory is locked (unable to read diagnostic info)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_lock_succeeds() {
        let dir = tempdir().unwrap();
        let lock = acquire_state_lock(dir.path(), "hivemind");
        assert!(lock.is_ok());
        assert!(lock.unwrap().lock_path().exists());
    }

    #[test]
    fn test_lock_path_convention() {
        let dir = tempdir().unwrap();
        let lock = acquire_state_lock(dir.path(), "hivemind").unwrap();
        assert_eq!(lock.lock_path(), dir.path().join("hivemind.lock"));
    }

    #[test]
    fn test_diagnostic_written() {
        let dir = tempdir().unwrap();
        let _lock = acquire_state_lock(dir.path(), "hivemind").unwrap();

        let contents = fs::read_to_string(dir.path().join("hivemind.lock")).unwrap();
        let diagnostic: LockDiagnostic = serde_json::from_str(&contents).unwrap();
        assert_eq!(diagnostic.pid, std::process::id());
        assert_eq!(diagnostic.agent, "hivemind");
    }

    #[test]
    fn test_creates_missing_state_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("deep").join("state");
        assert!(acquire_state_lock(&nested, "hivemind").is_ok());
        assert!(nested.exists());
    }

    #[test]
    fn test_invalid_state_dir_fails() {
        // /dev/null is a file, not a directory.
        let result = acquire_state_lock(Path::new("/dev/null/state"), "hivemind");
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_format() {
        let dir = tempdir().unwrap();
        let lock = acquire_state_lock(dir.path(), "hivemind").unwrap();
        let debug = format!("{:?}", lock);
        assert!(debug.contains("StateLock"));
        assert!(debug.contains("lock_path"));
    }

    #[test]
    fn test_contention_reports_holder_pid() {
        // A second open of the same lock file gets its own file description,
        // so flock denies it even within one process.
        let dir = tempdir().unwrap();
        let _held = acquire_state_lock(dir.path(), "first").unwrap();

        let err = acquire_state_lock(dir.path(), "second").unwrap_err();
        match err.downcast_ref::<HivemindError>() {
            Some(HivemindError::StateLocked(pid)) => assert_eq!(*pid, std::process::id()),
            other => panic!("expected StateLocked, got {:?}", other),
        }
        let rendered = format!("{err:#}");
        assert!(rendered.contains("held by agent 'first'"));
        assert!(rendered.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        {
            let _lock = acquire_state_lock(dir.path(), "hivemind").unwrap();
            assert!(acquire_state_lock(dir.path(), "intruder").is_err());
        }
        assert!(acquire_state_lock(dir.path(), "hivemind").is_ok());
    }
}
