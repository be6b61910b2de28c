// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory stores.

use std::marker::PhantomData;

use larder_tier::{Dependencies, FingerprintTracker};

use crate::store::InMemoryStore;

/// Builder for configuring an [`InMemoryStore`].
///
/// # Examples
///
/// ```
/// use larder_memory::InMemoryStore;
///
/// let store = InMemoryStore::<String>::builder()
///     .name("rendered-pages")
///     .initial_capacity(256)
///     .eviction_timers(true)
///     .build();
/// ```
pub struct InMemoryStoreBuilder<V> {
    pub(crate) name: &'static str,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) eviction_timers: bool,
    pub(crate) fingerprints: Option<FingerprintTracker>,
    _phantom: PhantomData<V>,
}

impl<V> std::fmt::Debug for InMemoryStoreBuilder<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStoreBuilder")
            .field("name", &self.name)
            .field("initial_capacity", &self.initial_capacity)
            .field("eviction_timers", &self.eviction_timers)
            .finish_non_exhaustive()
    }
}

impl<V> Default for InMemoryStoreBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryStoreBuilder<V> {
    /// Creates a builder with default settings: unnamed, eviction timers enabled,
    /// structural dependency comparison.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "memory",
            initial_capacity: None,
            eviction_timers: true,
            fingerprints: None,
            _phantom: PhantomData,
        }
    }

    /// Sets the name that identifies the store in logs.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Pre-allocates room for `capacity` entries.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Enables or disables eager eviction timers.
    ///
    /// Timers need an ambient tokio runtime when `set` is called; without one, expired
    /// entries are only removed lazily by reads. Disabling timers keeps the same
    /// visibility rules and only changes when memory is released.
    #[must_use]
    pub fn eviction_timers(mut self, enabled: bool) -> Self {
        self.eviction_timers = enabled;
        self
    }

    /// Compares dependency snapshots with `comparator` instead of structural equality.
    #[must_use]
    pub fn dependency_comparator(mut self, comparator: impl Fn(&Dependencies, &Dependencies) -> bool + Send + Sync + 'static) -> Self {
        self.fingerprints = Some(FingerprintTracker::with_comparator(comparator));
        self
    }

    /// Builds the configured store.
    #[must_use]
    pub fn build(self) -> InMemoryStore<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        InMemoryStore::from_builder(self)
    }
}
