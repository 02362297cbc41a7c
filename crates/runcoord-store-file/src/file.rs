// crates/runcoord-store-file/src/file.rs
// ============================================================================
// Module: Key/Value File
// Description: Durable snapshot storage in one properties file.
// Purpose: Provide crash-consistent load/save and locked read-modify-write
//          mutations shared by every process on the host.
// Dependencies: runcoord-core, fs2, tempfile, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`KeyValueFile`] stores a complete [`StoreSnapshot`] in one file. Reads
//! take no lock: every write goes to a temporary file in the same directory
//! and is renamed over the data file, so a reader always sees one complete
//! generation. Writers serialize through an exclusive advisory lock on the
//! sidecar `<path>.lock` file (see [`crate::lock`]) and always reload under
//! the lock before applying their change, so interleaved writers never lose
//! updates.
//!
//! A file that fails to parse is never written back: every mutation loads
//! under the lock first, and a corrupt load aborts the mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use runcoord_core::DEFAULT_MAX_VALUE_BYTES;
use runcoord_core::Fingerprint;
use runcoord_core::Mutation;
use runcoord_core::MutationOutcome;
use runcoord_core::StoreError;
use runcoord_core::StoreSnapshot;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::codec;
use crate::lock::FileLockGuard;
use crate::lock::lock_path_for;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lock acquisition timeout (ms).
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
/// Default pause between lock attempts (ms).
const DEFAULT_LOCK_RETRY_INTERVAL_MS: u64 = 10;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Attempts made by an unlocked read before reporting the store unavailable.
const READ_ATTEMPTS: u32 = 3;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for a file-backed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreConfig {
    /// Path to the properties file.
    pub path: PathBuf,
    /// Lock acquisition timeout in milliseconds.
    pub lock_timeout_ms: u64,
    /// Pause between lock attempts in milliseconds.
    pub lock_retry_interval_ms: u64,
    /// Flush file and directory to disk before a write returns.
    pub sync_writes: bool,
    /// Largest accepted value in bytes.
    pub max_value_bytes: usize,
}

impl FileStoreConfig {
    /// Creates a config for `path` with default limits.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            lock_retry_interval_ms: DEFAULT_LOCK_RETRY_INTERVAL_MS,
            sync_writes: true,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }

    /// Returns the lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Returns the pause between lock attempts.
    #[must_use]
    pub const fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// File store errors.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Filesystem error.
    #[error("file store io error: {0}")]
    Io(String),
    /// Lock not acquired within the timeout.
    #[error("file store lock {path} not acquired within {waited_ms} ms")]
    LockTimeout {
        /// Lock file path.
        path: String,
        /// Time spent waiting.
        waited_ms: u64,
    },
    /// File content cannot be parsed.
    #[error("file store corruption: {0}")]
    Corrupt(String),
    /// Invalid store configuration.
    #[error("file store invalid config: {0}")]
    Invalid(String),
    /// Input rejected by key or value validation.
    #[error(transparent)]
    Rejected(#[from] StoreError),
}

impl From<FileStoreError> for StoreError {
    fn from(error: FileStoreError) -> Self {
        match error {
            FileStoreError::Io(message) => Self::Unavailable(message),
            FileStoreError::LockTimeout {
                path,
                waited_ms,
            } => Self::Unavailable(format!("lock {path} not acquired within {waited_ms} ms")),
            FileStoreError::Corrupt(message) => Self::Corrupt(message),
            FileStoreError::Invalid(message) => Self::Invalid(message),
            FileStoreError::Rejected(error) => error,
        }
    }
}

// ============================================================================
// SECTION: Key/Value File
// ============================================================================

/// One properties file shared by every process that opens the same path.
#[derive(Debug)]
pub struct KeyValueFile {
    /// Store configuration.
    config: FileStoreConfig,
    /// Sidecar lock path.
    lock_path: PathBuf,
    /// Serializes writers within this instance so they queue here instead of
    /// spinning on the file lock.
    writer_gate: Mutex<()>,
}

impl KeyValueFile {
    /// Opens (without creating) the store file, creating its directory and
    /// lock file.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when the path is invalid or the directory
    /// or lock file cannot be created.
    pub fn open(config: FileStoreConfig) -> Result<Self, FileStoreError> {
        validate_store_path(&config.path)?;
        if config.lock_timeout_ms == 0 {
            return Err(FileStoreError::Invalid("lock_timeout_ms must be positive".to_string()));
        }
        ensure_parent_dir(&config.path)?;
        let lock_path = lock_path_for(&config.path);
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| {
                FileStoreError::Io(format!("create lock file {}: {err}", lock_path.display()))
            })?;
        Ok(Self {
            config,
            lock_path,
            writer_gate: Mutex::new(()),
        })
    }

    /// Returns the data file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &FileStoreConfig {
        &self.config
    }

    /// Reads and parses the current file. An absent file is an empty
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Corrupt`] when the content does not parse
    /// and [`FileStoreError::Io`] when the file stays unreadable.
    pub fn load(&self) -> Result<StoreSnapshot, FileStoreError> {
        let mut attempt = 1;
        let bytes = loop {
            match fs::read(&self.config.path) {
                Ok(bytes) => break bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Ok(StoreSnapshot::empty());
                }
                Err(err) if attempt < READ_ATTEMPTS => {
                    tracing::debug!(
                        path = %self.config.path.display(),
                        attempt,
                        error = %err,
                        "store read failed; retrying"
                    );
                    attempt += 1;
                    thread::sleep(self.config.lock_retry_interval());
                }
                Err(err) => {
                    return Err(FileStoreError::Io(format!(
                        "read {}: {err}",
                        self.config.path.display()
                    )));
                }
            }
        };
        let entries = codec::decode(&bytes).map_err(|err| {
            FileStoreError::Corrupt(format!("{}: {err}", self.config.path.display()))
        })?;
        Ok(StoreSnapshot::new(entries, Fingerprint::of_bytes(&bytes)))
    }

    /// Replaces the file content with `entries` under the lock.
    ///
    /// Returns the fingerprint of the written content.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when the lock cannot be obtained or the
    /// replacement cannot be written.
    pub fn save(&self, entries: &BTreeMap<String, String>) -> Result<Fingerprint, FileStoreError> {
        Mutation::Put(entries.clone()).validate(self.config.max_value_bytes)?;
        let _gate = self.gate()?;
        let _lock = self.acquire_lock()?;
        self.write_entries(entries)
    }

    /// Applies one mutation as a locked load-modify-save cycle.
    ///
    /// The file is rewritten only when the entry map actually changes.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when input is rejected, the lock cannot be
    /// obtained, the current file is corrupt, or the write fails.
    pub fn mutate(&self, mutation: &Mutation) -> Result<MutationOutcome, FileStoreError> {
        mutation.validate(self.config.max_value_bytes)?;
        let _gate = self.gate()?;
        let _lock = self.acquire_lock()?;
        let mut entries = self.load()?.entries;
        let outcome = mutation.apply(&mut entries);
        if outcome.changed {
            self.write_entries(&entries)?;
        }
        Ok(outcome)
    }

    /// Writes one value.
    ///
    /// # Errors
    ///
    /// See [`KeyValueFile::mutate`].
    pub fn set(&self, key: &str, value: &str) -> Result<(), FileStoreError> {
        let entries = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.mutate(&Mutation::Put(entries)).map(drop)
    }

    /// Writes several values in one cycle.
    ///
    /// # Errors
    ///
    /// See [`KeyValueFile::mutate`].
    pub fn set_many(&self, entries: &BTreeMap<String, String>) -> Result<(), FileStoreError> {
        self.mutate(&Mutation::Put(entries.clone())).map(drop)
    }

    /// Removes one key.
    ///
    /// # Errors
    ///
    /// See [`KeyValueFile::mutate`].
    pub fn delete(&self, key: &str) -> Result<(), FileStoreError> {
        self.mutate(&Mutation::Delete(BTreeSet::from([key.to_string()]))).map(drop)
    }

    /// Removes several keys in one cycle.
    ///
    /// # Errors
    ///
    /// See [`KeyValueFile::mutate`].
    pub fn delete_many(&self, keys: &BTreeSet<String>) -> Result<(), FileStoreError> {
        self.mutate(&Mutation::Delete(keys.clone())).map(drop)
    }

    /// Removes every key under `prefix` in one cycle.
    ///
    /// # Errors
    ///
    /// See [`KeyValueFile::mutate`].
    pub fn delete_prefix(&self, prefix: &str) -> Result<(), FileStoreError> {
        self.mutate(&Mutation::DeletePrefix(prefix.to_string())).map(drop)
    }

    /// Verifies the lock can be taken and the file parses.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when either check fails.
    pub fn check_access(&self) -> Result<(), FileStoreError> {
        let _lock = self.acquire_lock()?;
        self.load().map(drop)
    }

    /// Enters the in-process writer gate.
    fn gate(&self) -> Result<std::sync::MutexGuard<'_, ()>, FileStoreError> {
        self.writer_gate.lock().map_err(|_| {
            FileStoreError::Rejected(StoreError::Store(
                "file store writer gate poisoned".to_string(),
            ))
        })
    }

    /// Takes the cross-process lock.
    pub(crate) fn acquire_lock(&self) -> Result<FileLockGuard, FileStoreError> {
        FileLockGuard::acquire(
            &self.lock_path,
            self.config.lock_timeout(),
            self.config.lock_retry_interval(),
        )
    }

    /// Writes a complete replacement through a temp file and rename.
    ///
    /// Callers must hold the lock.
    fn write_entries(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<Fingerprint, FileStoreError> {
        let path = &self.config.path;
        let parent = parent_dir(path)?;
        let content = codec::encode(entries);
        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|err| FileStoreError::Io(format!("create temp file: {err}")))?;
        temp.write_all(content.as_bytes())
            .map_err(|err| FileStoreError::Io(format!("write temp file: {err}")))?;
        if self.config.sync_writes {
            temp.as_file()
                .sync_all()
                .map_err(|err| FileStoreError::Io(format!("sync temp file: {err}")))?;
        }
        temp.persist(path).map_err(|err| {
            FileStoreError::Io(format!("replace {}: {}", path.display(), err.error))
        })?;
        if self.config.sync_writes {
            sync_dir(parent)?;
        }
        Ok(Fingerprint::of_bytes(content.as_bytes()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the directory holding the store file.
fn parent_dir(path: &Path) -> Result<&Path, FileStoreError> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(parent) => Ok(parent),
        None => Err(FileStoreError::Io("store path missing parent directory".to_string())),
    }
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), FileStoreError> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(parent).map_err(|err| FileStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), FileStoreError> {
    if path.as_os_str().is_empty() {
        return Err(FileStoreError::Invalid("store path is empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(FileStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(FileStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(FileStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Flushes directory metadata so the rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), FileStoreError> {
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|err| FileStoreError::Io(format!("sync directory {}: {err}", dir.display())))
}

/// Directory handles cannot be synced on this platform.
#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps, reason = "Signature matches the unix implementation.")]
const fn sync_dir(_dir: &Path) -> Result<(), FileStoreError> {
    Ok(())
}
