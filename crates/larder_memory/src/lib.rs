// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Process-local cache store.
//!
//! This crate provides [`InMemoryStore`], a concurrent [`CacheStore`](larder_tier::CacheStore)
//! that keeps entries in a sharded map. Operations on different keys do not contend with
//! each other; operations on the same key are serialized by the shard lock.
//!
//! Entries written with a time-to-live are evicted lazily by the first read that finds
//! them expired, and eagerly by a timer armed at write time so that memory is not held by
//! entries nobody reads again.
//!
//! # Quick Start
//!
//! ```
//! use larder_memory::InMemoryStore;
//! use larder_tier::{CacheStore, SetOptions};
//! use std::time::Duration;
//!
//! # futures::executor::block_on(async {
//! let store = InMemoryStore::<String>::builder().name("pages").build();
//!
//! store.set("home", "<html/>".to_string(), SetOptions::new().ttl(Duration::from_secs(60))).await?;
//! let entry = store.get("home", None).await.expect("entry was just written");
//! assert_eq!(entry.value(), "<html/>");
//! # Ok::<(), larder_tier::Error>(())
//! # });
//! ```

pub mod builder;
pub mod store;

#[doc(inline)]
pub use builder::InMemoryStoreBuilder;
#[doc(inline)]
pub use store::InMemoryStore;
