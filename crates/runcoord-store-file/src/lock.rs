// crates/runcoord-store-file/src/lock.rs
// ============================================================================
// Module: Sidecar File Lock
// Description: Bounded-wait exclusive advisory lock on a sidecar lock file.
// Purpose: Serialize read-modify-write cycles across processes.
// Dependencies: fs2
// ============================================================================

//! ## Overview
//! The data file is replaced by rename on every write, so the lock cannot
//! live on the data file itself: a writer holding a lock on the old inode
//! would not exclude a writer that opened the new one. Writers instead lock
//! `<store>.lock`, which is created once and never replaced. Acquisition
//! polls `try_lock_exclusive` until the configured timeout elapses so a
//! wedged peer surfaces as an error instead of a hang.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use fs2::FileExt;

use crate::file::FileStoreError;

// ============================================================================
// SECTION: Lock Path
// ============================================================================

/// Returns the sidecar lock path for a store file.
#[must_use]
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Held exclusive lock; released on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    /// Open handle carrying the advisory lock.
    file: File,
    /// Lock file path, kept for diagnostics.
    path: PathBuf,
}

impl FileLockGuard {
    /// Acquires the exclusive lock, retrying every `retry` until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::LockTimeout`] when the lock stays contended
    /// past `timeout`, and [`FileStoreError::Io`] when the lock file cannot
    /// be opened or locked.
    pub fn acquire(
        path: &Path,
        timeout: Duration,
        retry: Duration,
    ) -> Result<Self, FileStoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| {
                FileStoreError::Io(format!("open lock file {}: {err}", path.display()))
            })?;
        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if is_contended(&err) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(FileStoreError::LockTimeout {
                            path: path.display().to_string(),
                            waited_ms: duration_millis(timeout),
                        });
                    }
                    thread::sleep(retry.min(deadline - now));
                }
                Err(err) => {
                    return Err(FileStoreError::Io(format!(
                        "lock {}: {err}",
                        path.display()
                    )));
                }
            }
        }
    }

    /// Returns the locked file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to release store lock"
            );
        }
    }
}

/// Returns true when the error means another holder owns the lock.
fn is_contended(err: &io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind() || err.kind() == io::ErrorKind::WouldBlock
}

/// Converts a duration to whole milliseconds, saturating.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
