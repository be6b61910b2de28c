// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache store backends.

use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::{CacheEntry, Dependencies, Error, Metadata};

/// Options applied to a [`CacheStore::set`] call.
///
/// # Examples
///
/// ```
/// use larder_tier::{Dependencies, SetOptions};
/// use std::time::Duration;
///
/// let options = SetOptions::new()
///     .ttl(Duration::from_secs(60))
///     .dependencies(Dependencies::from_iter(["v1"]))
///     .metadata("status", 200);
///
/// assert_eq!(options.ttl_value(), Some(Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    ttl: Option<Duration>,
    dependencies: Dependencies,
    metadata: Metadata,
}

impl SetOptions {
    /// Creates options for an entry that never expires by time and has no fingerprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time-to-live. A zero duration means "no expiry".
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the dependency snapshot stored as the entry's fingerprint.
    #[must_use]
    pub fn dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Adds one metadata field.
    #[must_use]
    pub fn metadata(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// The requested time-to-live.
    #[must_use]
    pub fn ttl_value(&self) -> Option<Duration> {
        self.ttl
    }

    /// The dependency snapshot.
    #[must_use]
    pub fn dependencies_value(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Splits the options into their parts.
    #[must_use]
    pub fn into_parts(self) -> (Option<Duration>, Dependencies, Metadata) {
        (self.ttl, self.dependencies, self.metadata)
    }
}

/// Trait for cache store implementations.
///
/// Every operation completes with a value; none of them panics on backend trouble:
///
/// - `get` turns backend failures, undecodable records, expired entries and dependency
///   mismatches into `None`, evicting the entry where it can.
/// - `set` and `remove` report backend failures as [`Error`] values the caller can log
///   and move on from. Only [`Error::InvalidTtl`] signals caller misuse.
///
/// Implementations must be safe to call concurrently. Operations on different keys should
/// not contend with each other; operations on the same key are serialized and `set` is
/// last-writer-wins.
pub trait CacheStore<V>: Send + Sync {
    /// Returns the entry for `key` if it is present and still valid.
    ///
    /// When `dependencies` is given, it is compared against the fingerprint recorded for
    /// the key; a mismatch evicts the entry.
    fn get(&self, key: &str, dependencies: Option<&Dependencies>) -> impl Future<Output = Option<CacheEntry<V>>> + Send;

    /// Stores `value` under `key`, replacing any previous entry, and returns the stored entry.
    fn set(&self, key: &str, value: V, options: SetOptions) -> impl Future<Output = Result<CacheEntry<V>, Error>> + Send;

    /// Returns `true` if an unexpired entry exists for `key`.
    fn has(&self, key: &str) -> impl Future<Output = bool> + Send;

    /// Removes the entry for `key`, returning whether one was present.
    ///
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Returns the number of entries, if the store tracks it.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the store holds no entries, if the store tracks its size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}

impl<V, S> CacheStore<V> for Arc<S>
where
    S: CacheStore<V>,
    V: Send,
{
    fn get(&self, key: &str, dependencies: Option<&Dependencies>) -> impl Future<Output = Option<CacheEntry<V>>> + Send {
        (**self).get(key, dependencies)
    }

    fn set(&self, key: &str, value: V, options: SetOptions) -> impl Future<Output = Result<CacheEntry<V>, Error>> + Send {
        (**self).set(key, value, options)
    }

    fn has(&self, key: &str) -> impl Future<Output = bool> + Send {
        (**self).has(key)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        (**self).remove(key)
    }

    fn len(&self) -> Option<u64> {
        (**self).len()
    }
}
