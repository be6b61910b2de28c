// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{marker::PhantomData, time::SystemTime};

use larder_tier::{CacheEntry, CacheStore, Dependencies, Error, Expiry, FingerprintTracker, Observation, SetOptions};
use serde::{Serialize, de::DeserializeOwned};

use crate::client::RemoteClient;

/// A [`CacheStore`] persisted in a remote key-value service.
///
/// Records live under `prefix + key` so several caches can share one keyspace. Records
/// written by a different schema version, records that fail to decode and records whose
/// deadline has passed are treated as misses and deleted.
///
/// # Examples
///
/// ```ignore
/// use larder_remote::{RemoteStore, testing::MemoryClient};
///
/// let store: RemoteStore<String, _> = RemoteStore::new(MemoryClient::new())
///     .with_prefix("pages:")
///     .with_name("pages");
/// ```
pub struct RemoteStore<V, C> {
    client: C,
    prefix: String,
    name: &'static str,
    fingerprints: FingerprintTracker,
    _value: PhantomData<fn() -> V>,
}

impl<V, C: std::fmt::Debug> std::fmt::Debug for RemoteStore<V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("client", &self.client)
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<V, C> RemoteStore<V, C>
where
    C: RemoteClient,
{
    /// Creates a store that talks to the backend through `client`.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            prefix: String::new(),
            name: "remote",
            fingerprints: FingerprintTracker::new(),
            _value: PhantomData,
        }
    }

    /// Stores every record under `prefix` followed by the cache key.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the name that identifies the store in logs.
    #[must_use]
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Compares dependency snapshots with `comparator` instead of structural equality.
    #[must_use]
    pub fn with_dependency_comparator(mut self, comparator: impl Fn(&Dependencies, &Dependencies) -> bool + Send + Sync + 'static) -> Self {
        self.fingerprints = FingerprintTracker::with_comparator(comparator);
        self
    }

    /// The client used to reach the backend.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// The dependency snapshots recorded for keys with a live record.
    #[must_use]
    pub fn fingerprints(&self) -> &FingerprintTracker {
        &self.fingerprints
    }

    /// Deletes a record that must not be served, logging rather than surfacing failures.
    async fn discard(&self, key: &str, record_key: &str, reason: &'static str) {
        self.fingerprints.forget(key);
        match self.client.delete(record_key).await {
            Ok(_) => tracing::debug!(cache.name = self.name, cache.key = record_key, cache.reason = reason, "cache.evicted"),
            Err(error) => tracing::warn!(
                cache.name = self.name,
                cache.key = record_key,
                cache.reason = reason,
                error = &error as &dyn std::error::Error,
                "cache.evict_failed"
            ),
        }
    }
}

impl<V, C> CacheStore<V> for RemoteStore<V, C>
where
    V: Serialize + DeserializeOwned + Send + Sync,
    C: RemoteClient,
{
    async fn get(&self, key: &str, dependencies: Option<&Dependencies>) -> Option<CacheEntry<V>> {
        let record_key = self.record_key(key);

        if let Some(deps) = dependencies
            && self.fingerprints.observe(key, deps) == Observation::Changed
        {
            self.discard(key, &record_key, "dependencies changed").await;
            return None;
        }

        let payload = match self.client.get(&record_key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.fingerprints.forget(key);
                return None;
            }
            Err(error) => {
                tracing::warn!(
                    cache.name = self.name,
                    cache.key = %record_key,
                    error = &error as &dyn std::error::Error,
                    "cache.read_failed"
                );
                return None;
            }
        };

        let entry: CacheEntry<V> = match serde_json::from_slice(&payload) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(
                    cache.name = self.name,
                    cache.key = %record_key,
                    error = &error as &dyn std::error::Error,
                    "cache.malformed"
                );
                self.discard(key, &record_key, "malformed").await;
                return None;
            }
        };

        let stale = if !entry.is_current_schema() {
            Some("schema")
        } else if entry.is_expired_at(SystemTime::now()) {
            Some("expired")
        } else if dependencies.is_some_and(|deps| !self.fingerprints.matches(entry.fingerprint(), deps)) {
            Some("fingerprint")
        } else {
            None
        };

        match stale {
            Some(reason) => {
                self.discard(key, &record_key, reason).await;
                None
            }
            None => Some(entry),
        }
    }

    async fn set(&self, key: &str, value: V, options: SetOptions) -> Result<CacheEntry<V>, Error> {
        let (ttl, dependencies, metadata) = options.into_parts();
        let expiry = Expiry::after(ttl, SystemTime::now())?;

        let entry = CacheEntry::new(key, value)
            .with_expiry(expiry)
            .with_fingerprint(dependencies)
            .with_metadata(metadata);
        let payload = serde_json::to_vec(&entry).map_err(Error::malformed)?;

        self.client
            .set(&self.record_key(key), payload, expiry.map(|expiry| expiry.expires_at()))
            .await?;
        self.fingerprints.record(key, entry.fingerprint());

        tracing::trace!(cache.name = self.name, cache.key = key, cache.ttl = ?ttl, "cache.stored");
        Ok(entry)
    }

    async fn has(&self, key: &str) -> bool {
        let record_key = self.record_key(key);
        match self.client.exists(&record_key).await {
            Ok(exists) => exists,
            Err(error) => {
                tracing::warn!(
                    cache.name = self.name,
                    cache.key = %record_key,
                    error = &error as &dyn std::error::Error,
                    "cache.read_failed"
                );
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, Error> {
        self.fingerprints.forget(key);
        self.client.delete(&self.record_key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryClient;

    #[test]
    fn record_key_applies_prefix() {
        let store: RemoteStore<String, _> = RemoteStore::new(MemoryClient::new()).with_prefix("pages:");
        assert_eq!(store.record_key("home"), "pages:home");
    }

    #[test]
    fn default_prefix_is_empty() {
        let store: RemoteStore<String, _> = RemoteStore::new(MemoryClient::new());
        assert_eq!(store.record_key("home"), "home");
    }
}
