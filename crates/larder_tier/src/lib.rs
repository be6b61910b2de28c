// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage contract shared by every larder cache store.
//!
//! This crate defines the [`CacheStore`] trait that backends implement, the
//! [`CacheEntry`] record they hold, the [`Expiry`] calculator that turns a time-to-live
//! into absolute expiry data, and the [`FingerprintTracker`] that invalidates entries when
//! caller-supplied [`Dependencies`] change.
//!
//! # Overview
//!
//! A store is read with an optional dependency snapshot. The entry is returned only when
//! it is still within its time-to-live and the snapshot equals the fingerprint recorded at
//! write time; otherwise the store evicts it and reports a miss:
//!
//! ```
//! use larder_tier::{Dependencies, Expiry};
//! use std::time::{Duration, SystemTime};
//!
//! let now = SystemTime::now();
//! let expiry = Expiry::after(Some(Duration::from_secs(60)), now)?.expect("ttl is non-zero");
//! assert!(!expiry.is_expired_at(now));
//! assert!(expiry.is_expired_at(now + Duration::from_secs(61)));
//!
//! let before = Dependencies::from_iter([1, 2]);
//! let after = Dependencies::from_iter([1, 3]);
//! assert_ne!(before, after);
//! # Ok::<(), larder_tier::Error>(())
//! ```
//!
//! # Implementing a Store
//!
//! Stores absorb backend failures on reads (a failing read is a miss) and report them on
//! writes. See `larder_memory` for a process-local store and `larder_remote` for a
//! key/value service adapter.

mod dependencies;
mod entry;
pub mod error;
mod expiry;
mod fingerprint;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use dependencies::Dependencies;
#[doc(inline)]
pub use entry::{CacheEntry, Metadata, SCHEMA_VERSION};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use expiry::{Expiry, MAX_TTL};
#[doc(inline)]
pub use fingerprint::{Comparator, FingerprintTracker, Observation};
#[doc(inline)]
pub use store::{CacheStore, SetOptions};
