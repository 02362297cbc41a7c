// crates/runcoord-core/src/core/watch.rs
// ============================================================================
// Module: Runcoord Watch Model
// Description: Watch identifiers, predicates, events, and snapshot diffing.
// Purpose: Turn two successive entry sets into per-key change notifications.
// Dependencies: uuid
// ============================================================================

//! ## Overview
//! Stores have no push channel, so change notification is synthesized by
//! comparing two entry sets. [`diff_entries`] walks both ordered maps once and
//! classifies each key as new, modified, or deleted; unchanged keys produce
//! nothing. Intermediate values between two diffs are never observed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::iter::Peekable;

use uuid::Uuid;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Identifier returned when a watch is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(Uuid);

impl WatchId {
    /// Creates a fresh random watch identifier.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Kind of transition observed for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEvent {
    /// Key was absent before and is present now.
    New,
    /// Key was present before and after with a different value.
    Modified,
    /// Key was present before and is absent now.
    Delete,
}

impl WatchEvent {
    /// Returns a stable label for the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Delete => "delete",
        }
    }
}

/// Which keys a watch is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchPredicate {
    /// Exactly one key.
    Key(String),
    /// Every key starting with the prefix.
    Prefix(String),
}

impl WatchPredicate {
    /// Returns true when `key` is covered by the predicate.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Key(expected) => expected == key,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }

    /// Returns the key or prefix text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Key(text) | Self::Prefix(text) => text,
        }
    }

    /// Returns the same predicate with `prefix` prepended to its text.
    #[must_use]
    pub fn with_prefix(&self, prefix: &str) -> Self {
        match self {
            Self::Key(key) => Self::Key(format!("{prefix}{key}")),
            Self::Prefix(inner) => Self::Prefix(format!("{prefix}{inner}")),
        }
    }
}

/// A single key transition delivered to watch callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotification {
    /// Key that changed.
    pub key: String,
    /// Kind of transition.
    pub event: WatchEvent,
    /// Value before the transition (`None` for [`WatchEvent::New`]).
    pub old_value: Option<String>,
    /// Value after the transition (`None` for [`WatchEvent::Delete`]).
    pub new_value: Option<String>,
}

// ============================================================================
// SECTION: Diffing
// ============================================================================

/// Classifies every key whose presence or value differs between two maps.
///
/// Output is ordered by key. Runs in `O(old + new)`.
#[must_use]
pub fn diff_entries(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<WatchNotification> {
    let mut changes = Vec::new();
    let mut left = old.iter().peekable();
    let mut right = new.iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => push_deleted(&mut changes, &mut left),
            (None, Some(_)) => push_new(&mut changes, &mut right),
            (Some((old_key, old_value)), Some((new_key, new_value))) => {
                match old_key.cmp(new_key) {
                    Ordering::Less => push_deleted(&mut changes, &mut left),
                    Ordering::Greater => push_new(&mut changes, &mut right),
                    Ordering::Equal => {
                        if old_value != new_value {
                            changes.push(WatchNotification {
                                key: (*new_key).clone(),
                                event: WatchEvent::Modified,
                                old_value: Some((*old_value).clone()),
                                new_value: Some((*new_value).clone()),
                            });
                        }
                        left.next();
                        right.next();
                    }
                }
            }
        }
    }
    changes
}

/// Cursor over one side of a diff.
type DiffCursor<'a> = Peekable<btree_map::Iter<'a, String, String>>;

/// Emits a delete for the entry under the cursor and advances it.
fn push_deleted(changes: &mut Vec<WatchNotification>, cursor: &mut DiffCursor<'_>) {
    if let Some((key, value)) = cursor.next() {
        changes.push(WatchNotification {
            key: key.clone(),
            event: WatchEvent::Delete,
            old_value: Some(value.clone()),
            new_value: None,
        });
    }
}

/// Emits a new-key event for the entry under the cursor and advances it.
fn push_new(changes: &mut Vec<WatchNotification>, cursor: &mut DiffCursor<'_>) {
    if let Some((key, value)) = cursor.next() {
        changes.push(WatchNotification {
            key: key.clone(),
            event: WatchEvent::New,
            old_value: None,
            new_value: Some(value.clone()),
        });
    }
}
