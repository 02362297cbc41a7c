// crates/runcoord-scheduler/src/runs.rs
// ============================================================================
// Module: Framework Runs
// Description: Run records reconstructed from `run.<name>.*` keys.
// Purpose: Give monitors a typed view of runs and the store transitions they
//          are allowed to perform.
// Dependencies: runcoord-core, time, tracing
// ============================================================================

//! ## Overview
//! A run exists only as the keys under `run.<name>.` in the scheduler's
//! namespace. [`RunRecord`] is rebuilt from those keys on every read and is
//! never written back as a whole. [`FrameworkRuns`] performs the transitions
//! monitors need: whole-run deletion, reset, and requeue. Transitions that
//! race with workers or other schedulers go through compare-and-swap on the
//! `status` key, so a transition applies at most once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use runcoord_core::NamespacedStore;
use runcoord_core::StatusStore;
use runcoord_core::StoreError;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Key Layout
// ============================================================================

/// Prefix shared by every run key.
pub const RUN_PREFIX: &str = "run.";

/// Field names under `run.<name>.`.
pub mod fields {
    /// Current lifecycle status.
    pub const STATUS: &str = "status";
    /// Last heartbeat written by the owning worker.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Time the run was (re)queued.
    pub const QUEUED: &str = "queued";
    /// Time the run finished.
    pub const FINISHED: &str = "finished";
    /// Earliest time a waiting run may be requeued.
    pub const WAIT_UNTIL: &str = "wait.until";
    /// Submitter of the run.
    pub const REQUESTOR: &str = "requestor";
    /// Test stream the run belongs to.
    pub const STREAM: &str = "stream";
    /// Test executed by the run.
    pub const TEST: &str = "test";
    /// Submission group.
    pub const GROUP: &str = "group";
    /// True for runs executing on a developer workstation.
    pub const LOCAL: &str = "local";
    /// True for runs that hold a shared environment.
    pub const SHARED_ENVIRONMENT: &str = "shared.environment";
    /// Expiry of the shared environment.
    pub const SHARED_ENVIRONMENT_EXPIRE: &str = "shared.environment.expire";
}

/// Well-known status values.
pub mod status {
    /// Waiting for capacity or a retry delay.
    pub const WAITING: &str = "waiting";
    /// Eligible to be picked up by a worker.
    pub const QUEUED: &str = "queued";
    /// Accepted but not yet queued.
    pub const PENDING: &str = "pending";
    /// Completed; subject to reaping.
    pub const FINISHED: &str = "finished";
}

/// Returns `run.<name>.`.
#[must_use]
pub fn run_prefix(name: &str) -> String {
    format!("{RUN_PREFIX}{name}.")
}

/// Returns `run.<name>.<field>`.
#[must_use]
pub fn run_key(name: &str, field: &str) -> String {
    format!("{RUN_PREFIX}{name}.{field}")
}

/// Splits `run.<name>.<field>` into its name and field.
#[must_use]
pub fn split_run_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(RUN_PREFIX)?;
    let (name, field) = rest.split_once('.')?;
    if name.is_empty() || field.is_empty() {
        return None;
    }
    Some((name, field))
}

// ============================================================================
// SECTION: Timestamps
// ============================================================================

/// Formats a timestamp the way run keys store it.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the time cannot be represented in
/// RFC 3339.
pub fn format_timestamp(at: OffsetDateTime) -> Result<String, StoreError> {
    at.format(&Rfc3339)
        .map_err(|err| StoreError::Invalid(format!("timestamp not representable: {err}")))
}

/// Parses an RFC 3339 timestamp.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

/// Parses an optional timestamp field, logging unparsable values.
fn timestamp_field(run: &str, field: &str, raw: Option<String>) -> Option<OffsetDateTime> {
    let raw = raw?;
    let parsed = parse_timestamp(&raw);
    if parsed.is_none() {
        tracing::warn!(run, field, value = %raw, "ignoring unparsable run timestamp");
    }
    parsed
}

/// Parses a boolean flag field.
fn flag_field(raw: Option<&String>) -> bool {
    raw.is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

// ============================================================================
// SECTION: Run Record
// ============================================================================

/// Typed view over the keys of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// Run name (the `<name>` segment).
    pub name: String,
    /// Raw status value, as stored.
    pub status: Option<String>,
    /// Last heartbeat.
    pub heartbeat: Option<OffsetDateTime>,
    /// Time queued.
    pub queued: Option<OffsetDateTime>,
    /// Time finished.
    pub finished: Option<OffsetDateTime>,
    /// Requeue time for waiting runs.
    pub wait_until: Option<OffsetDateTime>,
    /// Submitter.
    pub requestor: Option<String>,
    /// Test stream.
    pub stream: Option<String>,
    /// Test name.
    pub test: Option<String>,
    /// Submission group.
    pub group: Option<String>,
    /// Local run flag.
    pub local: bool,
    /// Shared environment flag.
    pub shared_environment: bool,
    /// Shared environment expiry.
    pub shared_environment_expire: Option<OffsetDateTime>,
    /// Fields without a typed slot, keyed by field name.
    pub extra: BTreeMap<String, String>,
}

impl RunRecord {
    /// Builds a record from its field map (keys relative to `run.<name>.`).
    #[must_use]
    pub fn from_fields(name: &str, mut entries: BTreeMap<String, String>) -> Self {
        let local = flag_field(entries.get(fields::LOCAL));
        let shared_environment = flag_field(entries.get(fields::SHARED_ENVIRONMENT));
        entries.remove(fields::LOCAL);
        entries.remove(fields::SHARED_ENVIRONMENT);
        Self {
            name: name.to_string(),
            status: entries.remove(fields::STATUS),
            heartbeat: timestamp_field(name, fields::HEARTBEAT, entries.remove(fields::HEARTBEAT)),
            queued: timestamp_field(name, fields::QUEUED, entries.remove(fields::QUEUED)),
            finished: timestamp_field(name, fields::FINISHED, entries.remove(fields::FINISHED)),
            wait_until: timestamp_field(
                name,
                fields::WAIT_UNTIL,
                entries.remove(fields::WAIT_UNTIL),
            ),
            requestor: entries.remove(fields::REQUESTOR),
            stream: entries.remove(fields::STREAM),
            test: entries.remove(fields::TEST),
            group: entries.remove(fields::GROUP),
            local,
            shared_environment,
            shared_environment_expire: timestamp_field(
                name,
                fields::SHARED_ENVIRONMENT_EXPIRE,
                entries.remove(fields::SHARED_ENVIRONMENT_EXPIRE),
            ),
            extra: entries,
        }
    }

    /// Returns true when the status equals `expected`, ignoring ASCII case.
    #[must_use]
    pub fn has_status(&self, expected: &str) -> bool {
        self.status.as_deref().is_some_and(|value| value.eq_ignore_ascii_case(expected))
    }

    /// Returns true when the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.has_status(status::FINISHED)
    }
}

/// Groups `run.<name>.<field>` entries into records.
fn group_runs(entries: BTreeMap<String, String>) -> Vec<RunRecord> {
    let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in entries {
        if let Some((name, field)) = split_run_key(&key) {
            grouped.entry(name.to_string()).or_default().insert(field.to_string(), value);
        }
    }
    grouped.into_iter().map(|(name, fields)| RunRecord::from_fields(&name, fields)).collect()
}

// ============================================================================
// SECTION: Reset Policy
// ============================================================================

/// Status a dead non-local run is reset to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Put the run straight back on the queue.
    #[default]
    Queued,
    /// Park the run until it is explicitly queued again.
    Pending,
}

impl ResetPolicy {
    /// Returns the status written on reset.
    #[must_use]
    pub const fn target_status(self) -> &'static str {
        match self {
            Self::Queued => status::QUEUED,
            Self::Pending => status::PENDING,
        }
    }
}

// ============================================================================
// SECTION: Framework Runs
// ============================================================================

/// Run operations over the scheduler's namespace.
#[derive(Clone)]
pub struct FrameworkRuns {
    /// Namespaced store holding the run keys.
    store: NamespacedStore,
}

impl FrameworkRuns {
    /// Creates the run view over `store`.
    #[must_use]
    pub const fn new(store: NamespacedStore) -> Self {
        Self {
            store,
        }
    }

    /// Returns the underlying namespaced store.
    #[must_use]
    pub const fn store(&self) -> &NamespacedStore {
        &self.store
    }

    /// Returns every run, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    pub fn all_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        Ok(group_runs(self.store.get_prefix(RUN_PREFIX)?))
    }

    /// Returns every run whose status is not finished.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    pub fn active_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut runs = self.all_runs()?;
        runs.retain(|run| !run.is_finished());
        Ok(runs)
    }

    /// Returns one run, or `None` when it has no keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    pub fn get_run(&self, name: &str) -> Result<Option<RunRecord>, StoreError> {
        let fields = self.store.get_prefix(&run_prefix(name))?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(RunRecord::from_fields(name, fields)))
    }

    /// Deletes every key of a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be written.
    pub fn delete_run(&self, name: &str) -> Result<(), StoreError> {
        self.store.delete_prefix(&run_prefix(name))
    }

    /// Resets a run to the policy's status, stamping `queued` and clearing
    /// the heartbeat.
    ///
    /// Returns false when the status changed since `run` was read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be written.
    pub fn reset_run(
        &self,
        run: &RunRecord,
        policy: ResetPolicy,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let stamp = BTreeMap::from([(run_key(&run.name, fields::QUEUED), format_timestamp(now)?)]);
        let swapped = self.store.put_swap_with(
            &run_key(&run.name, fields::STATUS),
            run.status.as_deref(),
            policy.target_status(),
            &stamp,
        )?;
        if swapped {
            self.store.delete(&run_key(&run.name, fields::HEARTBEAT))?;
        }
        Ok(swapped)
    }

    /// Moves a waiting run to queued, then clears `wait.until`.
    ///
    /// Returns false when another party changed the status first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be written.
    pub fn requeue_waiting_run(
        &self,
        run: &RunRecord,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let expected = run.status.as_deref().unwrap_or(status::WAITING);
        let stamp = BTreeMap::from([(run_key(&run.name, fields::QUEUED), format_timestamp(now)?)]);
        let swapped = self.store.put_swap_with(
            &run_key(&run.name, fields::STATUS),
            Some(expected),
            status::QUEUED,
            &stamp,
        )?;
        if swapped {
            self.store.delete(&run_key(&run.name, fields::WAIT_UNTIL))?;
        }
        Ok(swapped)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
