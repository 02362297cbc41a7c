// crates/runcoord-store-file/src/store.rs
// ============================================================================
// Module: File Status Store
// Description: StatusStore implementation over a shared properties file.
// Purpose: Combine the key/value file, compare-and-swap, and watch polling
//          behind the backend-agnostic store contract.
// Dependencies: runcoord-core, tracing
// ============================================================================

//! ## Overview
//! [`FileStatusStore`] is the file-backed [`StatusStore`]. Writes go straight
//! to the [`KeyValueFile`]; watch notifications come only from the poll loop,
//! so a change made by this process and one made by another process reach
//! watchers the same way and are never reported twice. Hosts that drive
//! polling themselves set `poll_interval_ms = 0` and call
//! [`FileStatusStore::poll_now`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use runcoord_core::DEFAULT_DELIVERY_QUEUE_DEPTH;
use runcoord_core::ShutdownSignal;
use runcoord_core::StatusStore;
use runcoord_core::StoreError;
use runcoord_core::WatchCallback;
use runcoord_core::WatchId;
use runcoord_core::WatchPredicate;
use runcoord_core::validate_key;
use runcoord_core::validate_prefix;

use crate::file::FileStoreConfig;
use crate::file::FileStoreError;
use crate::file::KeyValueFile;
use crate::poller::SnapshotPoller;
use crate::poller::run_poll_loop;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default poll interval (ms).
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Watch polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPollConfig {
    /// Poll interval in milliseconds; zero disables the background loop.
    pub poll_interval_ms: u64,
    /// Undelivered notifications buffered per watch.
    pub delivery_queue_depth: usize,
}

impl WatchPollConfig {
    /// Config with the background loop disabled.
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            poll_interval_ms: 0,
            delivery_queue_depth: DEFAULT_DELIVERY_QUEUE_DEPTH,
        }
    }
}

impl Default for WatchPollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            delivery_queue_depth: DEFAULT_DELIVERY_QUEUE_DEPTH,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// File-backed status store with polling change notification.
pub struct FileStatusStore {
    /// Backing file.
    file: Arc<KeyValueFile>,
    /// Snapshot differ and watch registry.
    poller: Arc<SnapshotPoller>,
    /// Stops the poll loop.
    signal: ShutdownSignal,
    /// Poll loop thread, when running.
    poll_thread: Mutex<Option<JoinHandle<()>>>,
}

impl FileStatusStore {
    /// Opens the store and starts the poll loop when an interval is set.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when the file cannot be opened or the poll
    /// thread cannot be spawned.
    pub fn open(config: FileStoreConfig, watch: WatchPollConfig) -> Result<Self, FileStoreError> {
        if watch.delivery_queue_depth == 0 {
            return Err(FileStoreError::Invalid(
                "delivery_queue_depth must be positive".to_string(),
            ));
        }
        let file = Arc::new(KeyValueFile::open(config)?);
        let poller = Arc::new(SnapshotPoller::new(Arc::clone(&file), watch.delivery_queue_depth));
        let signal = ShutdownSignal::new();
        let poll_thread = if watch.poll_interval_ms == 0 {
            None
        } else {
            let interval = Duration::from_millis(watch.poll_interval_ms);
            let loop_poller = Arc::clone(&poller);
            let loop_signal = signal.clone();
            let handle = thread::Builder::new()
                .name("runcoord-store-poll".to_string())
                .spawn(move || run_poll_loop(&loop_poller, interval, &loop_signal))
                .map_err(|err| FileStoreError::Io(format!("spawn poll thread: {err}")))?;
            Some(handle)
        };
        Ok(Self {
            file,
            poller,
            signal,
            poll_thread: Mutex::new(poll_thread),
        })
    }

    /// Returns the backing file.
    #[must_use]
    pub fn file(&self) -> &KeyValueFile {
        &self.file
    }

    /// Runs one poll tick synchronously.
    ///
    /// Returns the number of notifications enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file cannot be loaded.
    pub fn poll_now(&self) -> Result<usize, StoreError> {
        self.poller.poll_once()
    }

    /// Stops the poll loop and waits for it to exit. Idempotent.
    pub fn close(&self) {
        self.signal.request();
        let handle = match self.poll_thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!(path = %self.file.path().display(), "store poll thread panicked");
        }
    }
}

impl Drop for FileStatusStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl StatusStore for FileStatusStore {
    fn ensure_available(&self) -> Result<(), StoreError> {
        self.file.check_access().map_err(StoreError::from)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.file.load()?.get(key).map(str::to_string))
    }

    fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        validate_prefix(prefix)?;
        Ok(self.file.load()?.prefixed(prefix))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.file.set(key, value).map_err(StoreError::from)
    }

    fn put_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.file.set_many(entries).map_err(StoreError::from)
    }

    fn put_swap_with(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        others: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError> {
        self.file.compare_and_swap(key, expected, value, others).map_err(StoreError::from)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.file.delete(key).map_err(StoreError::from)
    }

    fn delete_all(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        self.file.delete_many(keys).map_err(StoreError::from)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.file.delete_prefix(prefix).map_err(StoreError::from)
    }

    fn watch(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError> {
        self.poller.register(predicate, callback)
    }

    fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.poller.unregister(id).map(drop)
    }
}
