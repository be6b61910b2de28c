// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock store for testing.
//!
//! [`MockStore`] keeps entries in memory, records every call and can be told to fail
//! selected operations, which makes it useful for exercising the failure paths of code
//! built on [`CacheStore`].

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use parking_lot::Mutex;

use crate::{CacheEntry, CacheStore, Dependencies, Error, Expiry, SetOptions};

/// Recorded store operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// A `get` for the key, with or without a dependency snapshot.
    Get {
        /// The key that was read.
        key: String,
        /// The snapshot supplied by the caller.
        dependencies: Option<Dependencies>,
    },
    /// A `set` for the key.
    Set(String),
    /// A `has` for the key.
    Has(String),
    /// A `remove` for the key.
    Remove(String),
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable in-memory store for tests.
///
/// Failing `get` and `has` calls behave like an unreachable backend: they report a miss.
/// Failing `set` and `remove` calls return [`Error::Unavailable`].
///
/// # Examples
///
/// ```ignore
/// use larder_tier::testing::{MockStore, StoreOp};
/// use larder_tier::{CacheStore, SetOptions};
///
/// # futures::executor::block_on(async {
/// let store = MockStore::<i32>::new();
/// store.set("key", 42, SetOptions::new()).await.unwrap();
/// assert_eq!(*store.get("key", None).await.unwrap().value(), 42);
///
/// store.fail_when(|op| matches!(op, StoreOp::Set(_)));
/// assert!(store.set("key", 7, SetOptions::new()).await.is_err());
/// # });
/// ```
pub struct MockStore<V> {
    data: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl<V: std::fmt::Debug> std::fmt::Debug for MockStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl<V> Clone for MockStore<V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<V> Default for MockStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MockStore<V> {
    /// Creates an empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes every operation matching `predicate` fail.
    pub fn fail_when(&self, predicate: impl Fn(&StoreOp) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Lets every operation succeed again.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a copy of the recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Returns `true` if the key is physically present, ignoring expiry.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Number of `set` calls recorded so far.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.operations.lock().iter().filter(|op| matches!(op, StoreOp::Set(_))).count()
    }

    /// Records `op` and returns whether it should fail.
    fn record(&self, op: StoreOp) -> bool {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        fail
    }
}

impl<V> CacheStore<V> for MockStore<V>
where
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &str, dependencies: Option<&Dependencies>) -> Option<CacheEntry<V>> {
        let op = StoreOp::Get {
            key: key.to_owned(),
            dependencies: dependencies.cloned(),
        };
        if self.record(op) {
            return None;
        }

        let mut data = self.data.lock();
        let entry = data.get(key)?;
        let stale = entry.is_expired_at(SystemTime::now()) || dependencies.is_some_and(|deps| deps != entry.fingerprint());
        if stale {
            data.remove(key);
            return None;
        }
        Some(entry.clone())
    }

    async fn set(&self, key: &str, value: V, options: SetOptions) -> Result<CacheEntry<V>, Error> {
        let (ttl, dependencies, metadata) = options.into_parts();
        let expiry = Expiry::after(ttl, SystemTime::now())?;
        if self.record(StoreOp::Set(key.to_owned())) {
            return Err(Error::unavailable("mock: set failed"));
        }

        let entry = CacheEntry::new(key, value)
            .with_expiry(expiry)
            .with_fingerprint(dependencies)
            .with_metadata(metadata);
        self.data.lock().insert(key.to_owned(), entry.clone());
        Ok(entry)
    }

    async fn has(&self, key: &str) -> bool {
        if self.record(StoreOp::Has(key.to_owned())) {
            return false;
        }
        self.data
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(SystemTime::now()))
    }

    async fn remove(&self, key: &str) -> Result<bool, Error> {
        if self.record(StoreOp::Remove(key.to_owned())) {
            return Err(Error::unavailable("mock: remove failed"));
        }
        Ok(self.data.lock().remove(key).is_some())
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}
