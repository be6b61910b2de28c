// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    error::WaitError,
    token::{LeaderToken, Waiter},
};

/// The followers parked on one in-flight computation.
pub(crate) struct WaiterSet<T> {
    pub(crate) flight: u64,
    pub(crate) waiters: Vec<(u64, oneshot::Sender<T>)>,
}

impl<T> WaiterSet<T> {
    fn new(flight: u64) -> Self {
        Self {
            flight,
            waiters: Vec::new(),
        }
    }
}

pub(crate) struct Pools<K, T> {
    pub(crate) sets: HashMap<K, WaiterSet<T>>,
    next_id: u64,
}

impl<K, T> Pools<K, T>
where
    K: Hash + Eq,
{
    fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn open(&mut self, key: K) -> u64 {
        let flight = self.next_id();
        self.sets.insert(key, WaiterSet::new(flight));
        flight
    }

    /// Registers a new follower on the pool for `key`, if one exists.
    fn register(&mut self, key: &K) -> Option<(u64, oneshot::Receiver<T>)> {
        let id = self.next_id();
        let set = self.sets.get_mut(key)?;
        let (sender, receiver) = oneshot::channel();
        set.waiters.push((id, sender));
        Some((id, receiver))
    }

    /// Removes the pool for `key` if it still belongs to `flight`.
    pub(crate) fn close(&mut self, key: &K, flight: u64) -> Option<WaiterSet<T>> {
        match self.sets.get(key) {
            Some(set) if set.flight == flight => self.sets.remove(key),
            _ => None,
        }
    }

    /// Drops the follower `id` from the pool for `key`, if it is still registered.
    pub(crate) fn unregister(&mut self, key: &K, id: u64) {
        if let Some(set) = self.sets.get_mut(key) {
            set.waiters.retain(|(waiter, _)| *waiter != id);
        }
    }
}

pub(crate) type Shared<K, T> = Arc<Mutex<Pools<K, T>>>;

/// Outcome of [`Coordinator::try_become_leader`].
#[derive(Debug)]
pub enum Election<K: Hash + Eq, T> {
    /// The caller created the pool and must compute the value.
    Leader(LeaderToken<K, T>),
    /// A computation is already in flight.
    Busy {
        /// Followers already parked on the in-flight computation.
        waiters: usize,
    },
}

/// Outcome of [`Coordinator::enter`].
#[derive(Debug)]
pub enum Role<K: Hash + Eq, T> {
    /// The caller created the pool and must compute the value.
    Leader(LeaderToken<K, T>),
    /// The caller joined an in-flight computation.
    Follower(Waiter<K, T>),
}

/// Elects one leader per key and fans its result out to every follower.
///
/// A coordinator is an ordinary value: create one per cache (or per test) and share it by
/// cloning, which is cheap and yields a handle onto the same pools.
///
/// Election and follower registration happen under a single lock that is held only for
/// map updates, never across an `.await`.
pub struct Coordinator<K, T> {
    pools: Shared<K, T>,
}

impl<K, T> Clone for Coordinator<K, T> {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
        }
    }
}

impl<K, T> Default for Coordinator<K, T> {
    fn default() -> Self {
        Self {
            pools: Arc::new(Mutex::new(Pools {
                sets: HashMap::new(),
                next_id: 0,
            })),
        }
    }
}

impl<K, T> Debug for Coordinator<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("in_flight", &self.pools.lock().sets.len())
            .finish()
    }
}

impl<K, T> Coordinator<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Creates a coordinator with no computations in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the pool for `key` and elects the caller as its leader, unless a
    /// computation is already in flight.
    pub fn try_become_leader(&self, key: K) -> Election<K, T> {
        let mut pools = self.pools.lock();
        if let Some(set) = pools.sets.get(&key) {
            return Election::Busy {
                waiters: set.waiters.len(),
            };
        }
        let flight = pools.open(key.clone());
        drop(pools);

        tracing::debug!(pool.flight = flight, "pool.elected");
        Election::Leader(LeaderToken::new(key, flight, Arc::clone(&self.pools)))
    }

    /// Either elects the caller as leader or registers it as a follower, in one atomic step.
    ///
    /// Prefer this over [`try_become_leader`](Self::try_become_leader) followed by
    /// [`join`](Self::join): between those two calls the leader may resolve, leaving the
    /// caller with nothing to join.
    pub fn enter(&self, key: K) -> Role<K, T> {
        let mut pools = self.pools.lock();
        if let Some((id, receiver)) = pools.register(&key) {
            drop(pools);
            return Role::Follower(Waiter::new(key, id, receiver, Arc::clone(&self.pools)));
        }
        let flight = pools.open(key.clone());
        drop(pools);

        tracing::debug!(pool.flight = flight, "pool.elected");
        Role::Leader(LeaderToken::new(key, flight, Arc::clone(&self.pools)))
    }

    /// Joins the computation in flight for `key` and waits up to `timeout` for its result.
    ///
    /// Every follower gets its own clock: a timed out follower is unregistered and the
    /// leader and other followers carry on.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Vacant`] when nothing is in flight for `key`,
    /// [`WaitError::TimedOut`] when `timeout` elapses first, and [`WaitError::Abandoned`]
    /// when the leader goes away without resolving.
    pub async fn join(&self, key: K, timeout: Duration) -> Result<T, WaitError> {
        let registered = self.pools.lock().register(&key);
        let Some((id, receiver)) = registered else {
            return Err(WaitError::Vacant);
        };
        Waiter::new(key, id, receiver, Arc::clone(&self.pools)).wait(timeout).await
    }

    /// Publishes `value` to every follower of the token's pool and discards the pool.
    ///
    /// Equivalent to [`LeaderToken::resolve`]. Returns the number of followers that
    /// received the value.
    pub fn resolve(&self, token: LeaderToken<K, T>, value: T) -> usize
    where
        T: Clone,
    {
        token.resolve(value)
    }

    /// Number of followers parked on `key`, or `None` when nothing is in flight for it.
    #[must_use]
    pub fn waiting(&self, key: &K) -> Option<usize> {
        self.pools.lock().sets.get(key).map(|set| set.waiters.len())
    }

    /// Number of keys with a computation in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pools.lock().sets.len()
    }
}
