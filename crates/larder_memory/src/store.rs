// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementation.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use dashmap::DashMap;
use larder_tier::{CacheEntry, CacheStore, Dependencies, Error, Expiry, FingerprintTracker, Observation, SetOptions};
use tokio::{task::AbortHandle, time::Instant};

use crate::builder::InMemoryStoreBuilder;

/// A stored entry together with its eviction bookkeeping.
struct Slot<V> {
    entry: CacheEntry<V>,
    deadline: Option<Instant>,
    generation: u64,
    timer: Option<AbortHandle>,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

impl<V> Drop for Slot<V> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner<V> {
    name: &'static str,
    slots: DashMap<String, Slot<V>>,
    fingerprints: FingerprintTracker,
    generations: AtomicU64,
    eviction_timers: bool,
}

impl<V> Inner<V> {
    /// Removes `key` only if it still holds the write identified by `generation`.
    fn evict_generation(&self, key: &str, generation: u64, reason: &'static str) -> bool {
        let evicted = self.slots.remove_if(key, |_, slot| slot.generation == generation).is_some();
        if evicted {
            self.fingerprints.forget(key);
            tracing::debug!(cache.name = self.name, cache.key = key, cache.reason = reason, "cache.evicted");
        }
        evicted
    }

    fn evict(&self, key: &str, reason: &'static str) -> bool {
        self.fingerprints.forget(key);
        let evicted = self.slots.remove(key).is_some();
        if evicted {
            tracing::debug!(cache.name = self.name, cache.key = key, cache.reason = reason, "cache.evicted");
        }
        evicted
    }
}

/// What a read decided while holding the shard lock.
enum Lookup<V> {
    Hit(CacheEntry<V>),
    Stale { generation: u64, reason: &'static str },
    Absent,
}

/// Concurrent process-local cache store.
///
/// Cloning is cheap and every clone shares the same entries.
///
/// Visibility rules:
///
/// - an entry is visible from the moment `set` returns until its time-to-live elapses, it
///   is overwritten or removed, or a read supplies a dependency snapshot that differs from
///   the snapshot the store last saw for the key;
/// - an entry written without a time-to-live never expires;
/// - overwriting a key cancels the pending eviction of the previous value, so the old
///   timer can never remove the new value.
pub struct InMemoryStore<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for InMemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for InMemoryStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("name", &self.inner.name)
            .field("len", &self.inner.slots.len())
            .field("eviction_timers", &self.inner.eviction_timers)
            .finish_non_exhaustive()
    }
}

impl<V> Default for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a store with default settings.
    #[must_use]
    pub fn new() -> Self {
        InMemoryStoreBuilder::new().build()
    }

    /// Returns a builder for configuring the store.
    #[must_use]
    pub fn builder() -> InMemoryStoreBuilder<V> {
        InMemoryStoreBuilder::new()
    }

    pub(crate) fn from_builder(builder: InMemoryStoreBuilder<V>) -> Self {
        let slots = builder.initial_capacity.map_or_else(DashMap::new, DashMap::with_capacity);
        Self {
            inner: Arc::new(Inner {
                name: builder.name,
                slots,
                fingerprints: builder.fingerprints.unwrap_or_default(),
                generations: AtomicU64::new(0),
                eviction_timers: builder.eviction_timers,
            }),
        }
    }

    /// The name given to the store at construction.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The dependency snapshots recorded for live entries.
    #[must_use]
    pub fn fingerprints(&self) -> &FingerprintTracker {
        &self.inner.fingerprints
    }

    /// Removes every entry and forgets every dependency snapshot.
    pub fn clear(&self) {
        self.inner.slots.clear();
        self.inner.fingerprints.forget_all();
    }

    fn lookup(&self, key: &str, dependencies: Option<&Dependencies>, now: Instant) -> Lookup<V> {
        let Some(slot) = self.inner.slots.get(key) else {
            return Lookup::Absent;
        };
        if slot.is_expired(now) {
            return Lookup::Stale {
                generation: slot.generation,
                reason: "expired",
            };
        }
        if dependencies.is_some_and(|deps| !self.inner.fingerprints.matches(slot.entry.fingerprint(), deps)) {
            return Lookup::Stale {
                generation: slot.generation,
                reason: "fingerprint",
            };
        }
        Lookup::Hit(slot.entry.clone())
    }

    /// Spawns the eager eviction task for a write, if a runtime is available.
    fn arm_timer(&self, key: &str, generation: u64, deadline: Instant) -> Option<AbortHandle> {
        if !self.inner.eviction_timers {
            return None;
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let inner: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        let key = key.to_owned();
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                inner.evict_generation(&key, generation, "timer");
            }
        });
        Some(task.abort_handle())
    }
}

impl<V> CacheStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str, dependencies: Option<&Dependencies>) -> Option<CacheEntry<V>> {
        if let Some(deps) = dependencies
            && self.inner.fingerprints.observe(key, deps) == Observation::Changed
        {
            self.inner.evict(key, "dependencies changed");
            return None;
        }

        match self.lookup(key, dependencies, Instant::now()) {
            Lookup::Hit(entry) => Some(entry),
            Lookup::Stale { generation, reason } => {
                self.inner.evict_generation(key, generation, reason);
                None
            }
            Lookup::Absent => {
                // Slots are authoritative; a snapshot for an absent key is only bookkeeping.
                if dependencies.is_some() {
                    self.inner.fingerprints.forget(key);
                }
                None
            }
        }
    }

    async fn set(&self, key: &str, value: V, options: SetOptions) -> Result<CacheEntry<V>, Error> {
        let (ttl, dependencies, metadata) = options.into_parts();
        let expiry = Expiry::after(ttl, SystemTime::now())?;
        let deadline = expiry.as_ref().map(|expiry| Instant::now() + expiry.ttl());

        let entry = CacheEntry::new(key, value)
            .with_expiry(expiry)
            .with_fingerprint(dependencies)
            .with_metadata(metadata);
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);

        self.inner.fingerprints.record(key, entry.fingerprint());

        // The previous slot, if any, is dropped here and its timer aborted.
        self.inner.slots.insert(
            key.to_owned(),
            Slot {
                entry: entry.clone(),
                deadline,
                generation,
                timer: None,
            },
        );

        if let Some(deadline) = deadline
            && let Some(timer) = self.arm_timer(key, generation, deadline)
        {
            match self.inner.slots.get_mut(key) {
                Some(mut slot) if slot.generation == generation => slot.timer = Some(timer),
                _ => timer.abort(),
            }
        }

        tracing::trace!(cache.name = self.inner.name, cache.key = key, cache.ttl = ?ttl, "cache.stored");
        Ok(entry)
    }

    async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let expired = match self.inner.slots.get(key) {
            None => return false,
            Some(slot) if slot.is_expired(now) => slot.generation,
            Some(_) => return true,
        };
        self.inner.evict_generation(key, expired, "expired");
        false
    }

    async fn remove(&self, key: &str) -> Result<bool, Error> {
        Ok(self.inner.evict(key, "removed"))
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.slots.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn overwrite_cancels_previous_timer() {
        let store = InMemoryStore::<u32>::new();
        store
            .set("k", 1, SetOptions::new().ttl(Duration::from_secs(10)))
            .await
            .expect("set should succeed");
        store
            .set("k", 2, SetOptions::new().ttl(Duration::from_secs(60)))
            .await
            .expect("set should succeed");

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.get("k", None).await.map(CacheEntry::into_value), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_not_evicted() {
        let store = InMemoryStore::<u32>::new();
        store.set("k", 1, SetOptions::new()).await.expect("set should succeed");

        let current = store.inner.slots.get("k").map(|slot| slot.generation).expect("slot exists");
        assert!(!store.inner.evict_generation("k", current + 1, "test"));
        assert!(store.inner.evict_generation("k", current, "test"));
        assert!(!store.has("k").await);
    }

    #[test]
    fn set_without_runtime_skips_timer() {
        let store = InMemoryStore::<u32>::new();
        futures::executor::block_on(async {
            store
                .set("k", 1, SetOptions::new().ttl(Duration::from_secs(1)))
                .await
                .expect("set should succeed");
        });

        let slot = store.inner.slots.get("k").expect("slot exists");
        assert!(slot.timer.is_none());
        assert!(slot.deadline.is_some());
    }
}
