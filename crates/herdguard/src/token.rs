// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, hash::Hash, time::Duration};

use tokio::sync::oneshot;

use crate::{coordinator::Shared, error::WaitError};

/// Proof that the holder leads the computation for a key.
///
/// Resolve it exactly once with [`resolve`](Self::resolve). Dropping the token without
/// resolving discards the pool and releases every follower with [`WaitError::Abandoned`].
#[must_use = "followers are released as abandoned when the token is dropped"]
pub struct LeaderToken<K: Hash + Eq, T> {
    key: K,
    flight: u64,
    pools: Shared<K, T>,
    settled: bool,
}

impl<K: Hash + Eq, T> LeaderToken<K, T> {
    pub(crate) fn new(key: K, flight: u64, pools: Shared<K, T>) -> Self {
        Self {
            key,
            flight,
            pools,
            settled: false,
        }
    }

    /// The key this token leads.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Number of followers currently parked on this computation.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.pools
            .lock()
            .sets
            .get(&self.key)
            .filter(|set| set.flight == self.flight)
            .map_or(0, |set| set.waiters.len())
    }

    /// Delivers `value` to every registered follower, then discards the pool so the next
    /// arrival for the key elects a new leader.
    ///
    /// Returns the number of followers that received the value. Zero followers is fine.
    pub fn resolve(mut self, value: T) -> usize
    where
        T: Clone,
    {
        self.settled = true;
        let Some(set) = self.pools.lock().close(&self.key, self.flight) else {
            return 0;
        };

        let delivered = set
            .waiters
            .into_iter()
            .map(|(_, sender)| sender.send(value.clone()).is_ok())
            .filter(|sent| *sent)
            .count();

        tracing::debug!(pool.flight = self.flight, pool.delivered = delivered, "pool.resolved");
        delivered
    }
}

impl<K: Hash + Eq, T> Drop for LeaderToken<K, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let abandoned = self.pools.lock().close(&self.key, self.flight);
        if let Some(set) = abandoned {
            tracing::warn!(pool.flight = self.flight, pool.waiters = set.waiters.len(), "pool.abandoned");
        }
    }
}

impl<K: Hash + Eq + Debug, T> Debug for LeaderToken<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderToken")
            .field("key", &self.key)
            .field("flight", &self.flight)
            .finish_non_exhaustive()
    }
}

/// A follower parked on an in-flight computation.
///
/// Dropping the waiter, whether after [`wait`](Self::wait) returns or because the caller
/// was cancelled, unregisters it from the pool.
#[must_use = "a waiter does nothing unless waited on"]
pub struct Waiter<K: Hash + Eq, T> {
    key: K,
    id: u64,
    receiver: oneshot::Receiver<T>,
    pools: Shared<K, T>,
}

impl<K: Hash + Eq, T> Waiter<K, T> {
    pub(crate) fn new(key: K, id: u64, receiver: oneshot::Receiver<T>, pools: Shared<K, T>) -> Self {
        Self { key, id, receiver, pools }
    }

    /// The key this waiter is parked on.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Waits up to `timeout` for the leader's result.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::TimedOut`] when `timeout` elapses first and
    /// [`WaitError::Abandoned`] when the leader goes away without resolving.
    pub async fn wait(mut self, timeout: Duration) -> Result<T, WaitError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => {
                tracing::debug!(pool.waiter = self.id, pool.timeout = ?timeout, "pool.timed_out");
                Err(WaitError::TimedOut)
            }
        }
    }
}

impl<K: Hash + Eq, T> Drop for Waiter<K, T> {
    fn drop(&mut self) {
        self.pools.lock().unregister(&self.key, self.id);
    }
}

impl<K: Hash + Eq + Debug, T> Debug for Waiter<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
