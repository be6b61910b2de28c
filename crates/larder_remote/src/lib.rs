// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Remote key-value backend adapter.
//!
//! [`RemoteStore`] implements [`CacheStore`](larder_tier::CacheStore) on top of any
//! [`RemoteClient`], a minimal byte-oriented view of a key-value service. Each cache entry
//! is persisted as one JSON record holding the value, its dependency fingerprint, its
//! expiry and the schema version of the writer. Absolute expiry is handed to the backend,
//! which drops the record on its own once the deadline passes.
//!
//! A backend that cannot be reached never fails the caller's control flow: reads become
//! misses and writes report [`Error::Unavailable`](larder_tier::Error::Unavailable).
//!
//! # Features
//!
//! - `redis`: enables [`RedisClient`], a client over a Redis connection manager.
//! - `test-util`: enables [`testing::MemoryClient`], an in-process client that can be
//!   disconnected on demand.

mod client;
mod store;

#[cfg(feature = "redis")]
mod redis_client;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

pub use client::RemoteClient;
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub use redis_client::RedisClient;
pub use store::RemoteStore;
