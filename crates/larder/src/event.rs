// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{borrow::Cow, time::Duration};

use http::StatusCode;

/// Something the cache did while serving a request.
///
/// For every request the cache emits, in order: either a [`Hit`](Self::Hit) or a
/// [`Miss`](Self::Miss); on the computing path a [`Stored`](Self::Stored) or
/// [`NotStored`](Self::NotStored), followed by a [`PoolSend`](Self::PoolSend) when the
/// request led a pool; and finally exactly one [`Finished`](Self::Finished). A missed
/// request whose store re-check finds the entry reports that `Hit` after its `Miss`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    /// A fresh entry was served from the store.
    Hit {
        /// The cache key.
        key: String,
        /// Status of the served response.
        status: StatusCode,
    },
    /// No usable entry was found.
    Miss {
        /// The cache key.
        key: String,
        /// Every reason that contributed to the miss.
        reasons: Vec<MissReason>,
    },
    /// The computed response was written to the store.
    Stored {
        /// The cache key.
        key: String,
        /// Time-to-live the entry was written with; `None` means no expiry.
        ttl: Option<Duration>,
    },
    /// The computed response was not written to the store.
    NotStored {
        /// The cache key.
        key: String,
        /// Why the write was skipped or failed.
        reason: Option<Cow<'static, str>>,
    },
    /// A leader published its response to the followers of its pool.
    PoolSend {
        /// The cache key.
        key: String,
        /// Followers that received the response.
        waiters: usize,
    },
    /// The request is done.
    Finished {
        /// The cache key.
        key: String,
        /// How the response was obtained.
        outcome: Outcome,
    },
}

impl CacheEvent {
    /// The key the event is about.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Hit { key, .. }
            | Self::Miss { key, .. }
            | Self::Stored { key, .. }
            | Self::NotStored { key, .. }
            | Self::PoolSend { key, .. }
            | Self::Finished { key, .. } => key,
        }
    }

    /// The kind of event, without its data.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Hit { .. } => EventKind::Hit,
            Self::Miss { .. } => EventKind::Miss,
            Self::Stored { .. } => EventKind::Stored,
            Self::NotStored { .. } => EventKind::NotStored,
            Self::PoolSend { .. } => EventKind::PoolSend,
            Self::Finished { .. } => EventKind::Finished,
        }
    }
}

/// The kind of a [`CacheEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventKind {
    /// See [`CacheEvent::Hit`].
    Hit,
    /// See [`CacheEvent::Miss`].
    Miss,
    /// See [`CacheEvent::Stored`].
    Stored,
    /// See [`CacheEvent::NotStored`].
    NotStored,
    /// See [`CacheEvent::PoolSend`].
    PoolSend,
    /// See [`CacheEvent::Finished`].
    Finished,
}

impl EventKind {
    /// Stable lowercase name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Stored => "stored",
            Self::NotStored => "not_stored",
            Self::PoolSend => "pool_send",
            Self::Finished => "finished",
        }
    }
}

/// Why a request missed the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MissReason {
    /// The read policy denied reading, with its reason if it gave one.
    ReadDenied(Option<Cow<'static, str>>),
    /// The store held no usable entry.
    NotPresent,
    /// Another request was already computing the response.
    Pooled {
        /// Followers parked on that computation, this request included.
        waiters: usize,
    },
}

/// How a finished request obtained its response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Outcome {
    /// Served from the store.
    Hit,
    /// Received from the leader of a pool.
    Pooled,
    /// Computed by the downstream service.
    Computed,
    /// Gave up waiting for the leader of a pool.
    TimedOut,
    /// The downstream service returned an error.
    Failed,
}

impl Outcome {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Pooled => "pooled",
            Self::Computed => "computed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }
}
