// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::Dependencies;

/// Decides whether two dependency snapshots describe the same state.
pub type Comparator = Arc<dyn Fn(&Dependencies, &Dependencies) -> bool + Send + Sync>;

/// Result of comparing a read-time snapshot with the last one seen for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// First snapshot for the key, or identical to the previous one.
    Unchanged,
    /// The snapshot differs from the previous one; entries for the key are stale.
    Changed,
}

/// Per-key record of the last-seen dependency snapshot.
///
/// Stores consult the tracker on every read that carries a snapshot. A key observed for
/// the first time is never reported as changed. When a change is observed the tracker
/// adopts the new snapshot, so an entry written under the new state is not immediately
/// flagged again.
///
/// Stores forget a key once nothing is stored under it, so the tracker only holds keys
/// with a live entry or a read in progress.
///
/// # Examples
///
/// ```
/// use larder_tier::{Dependencies, FingerprintTracker, Observation};
///
/// let tracker = FingerprintTracker::new();
/// let v1 = Dependencies::from_iter([1]);
/// let v2 = Dependencies::from_iter([2]);
///
/// assert_eq!(tracker.observe("page", &v1), Observation::Unchanged);
/// assert_eq!(tracker.observe("page", &v1), Observation::Unchanged);
/// assert_eq!(tracker.observe("page", &v2), Observation::Changed);
/// assert_eq!(tracker.observe("page", &v2), Observation::Unchanged);
/// ```
pub struct FingerprintTracker {
    seen: DashMap<String, Dependencies>,
    comparator: Option<Comparator>,
}

impl Debug for FingerprintTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintTracker")
            .field("keys", &self.seen.len())
            .field("custom_comparator", &self.comparator.is_some())
            .finish()
    }
}

impl Default for FingerprintTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintTracker {
    /// Creates a tracker using structural equality of [`Dependencies`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
            comparator: None,
        }
    }

    /// Creates a tracker that compares snapshots with `comparator`.
    ///
    /// The comparator must be deterministic; it receives the previous snapshot first.
    #[must_use]
    pub fn with_comparator(comparator: impl Fn(&Dependencies, &Dependencies) -> bool + Send + Sync + 'static) -> Self {
        Self {
            seen: DashMap::new(),
            comparator: Some(Arc::new(comparator)),
        }
    }

    /// Returns `true` if `previous` and `current` describe the same state.
    #[must_use]
    pub fn matches(&self, previous: &Dependencies, current: &Dependencies) -> bool {
        match &self.comparator {
            Some(comparator) => comparator(previous, current),
            None => previous == current,
        }
    }

    /// Compares `snapshot` with the last snapshot seen for `key` and records it.
    pub fn observe(&self, key: &str, snapshot: &Dependencies) -> Observation {
        if let Some(mut previous) = self.seen.get_mut(key) {
            if self.matches(&previous, snapshot) {
                return Observation::Unchanged;
            }
            *previous = snapshot.clone();
            return Observation::Changed;
        }

        match self.seen.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(snapshot.clone());
                Observation::Unchanged
            }
            // Another reader recorded the key between the lookup and the insert.
            Entry::Occupied(mut occupied) => {
                if self.matches(occupied.get(), snapshot) {
                    Observation::Unchanged
                } else {
                    occupied.insert(snapshot.clone());
                    Observation::Changed
                }
            }
        }
    }

    /// Records the snapshot an entry was written under.
    pub fn record(&self, key: &str, snapshot: &Dependencies) {
        self.seen.insert(key.to_owned(), snapshot.clone());
    }

    /// Returns the last snapshot seen for `key`.
    #[must_use]
    pub fn last_seen(&self, key: &str) -> Option<Dependencies> {
        self.seen.get(key).map(|snapshot| snapshot.clone())
    }

    /// Forgets everything recorded for `key`.
    pub fn forget(&self, key: &str) {
        self.seen.remove(key);
    }

    /// Forgets every recorded snapshot.
    pub fn forget_all(&self) {
        self.seen.clear();
    }

    /// Number of keys with a recorded snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if no snapshot is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
