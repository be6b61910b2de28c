// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! HTTP response cache middleware with request pooling.
//!
//! This crate caches buffered HTTP responses in any [`CacheStore`] and protects the
//! downstream service from thundering herds:
//! - Responses are keyed per request, stored with a time-to-live and invalidated when the
//!   caller's [`Dependencies`] snapshot changes
//! - Concurrent misses for one key are pooled: a single leader computes the response and
//!   every follower receives a copy, each waiting with its own timeout
//! - Read and write policies decide per request what is served from and written to the
//!   store
//! - Every step is reported as a [`CacheEvent`] through `tracing`, an optional callback and,
//!   with the `metrics` feature, an OpenTelemetry counter
//!
//! # Examples
//!
//! ## Driving the Cache Directly
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use larder::ResponseCacheBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), std::convert::Infallible> {
//! let cache = ResponseCacheBuilder::in_memory()
//!     .entry_ttl(|_| Duration::from_secs(60))
//!     .on_event(|parts, event| println!("{} {:?}", parts.uri, event.kind()))
//!     .build();
//!
//! let request = Request::get("/catalog").body(()).expect("valid request");
//! let response = cache
//!     .handle(request, |_request| async {
//!         Ok::<_, std::convert::Infallible>(Response::new(Bytes::from_static(b"items")))
//!     })
//!     .await?;
//! assert_eq!(response.body(), "items");
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading Settings
//!
//! ```
//! use larder::{ResponseCache, Settings};
//! use larder_memory::InMemoryStore;
//!
//! let settings: Settings = serde_json::from_str(r#"{ "name": "catalog", "pool_wait_timeout_ms": 5000 }"#)?;
//! let cache = ResponseCache::builder(InMemoryStore::new()).settings(&settings)?.build();
//!
//! assert_eq!(cache.name(), "catalog");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Features
//!
//! - `memory` (default): `ResponseCacheBuilder::in_memory` over `larder_memory`.
//! - `metrics`: `ResponseCacheBuilder::metrics` counting events as `larder.event.count`.

mod builder;
mod cache;
mod decision;
mod error;
mod event;
mod response;
mod service;
mod settings;
mod telemetry;

#[doc(inline)]
pub use builder::ResponseCacheBuilder;
#[doc(inline)]
pub use cache::ResponseCache;
#[doc(inline)]
pub use decision::Decision;
#[doc(inline)]
pub use error::ConfigError;
#[doc(inline)]
pub use event::{CacheEvent, EventKind, MissReason, Outcome};
#[doc(inline)]
pub use larder_tier::{CacheStore, Dependencies};
#[doc(inline)]
pub use response::CachedResponse;
#[doc(inline)]
pub use service::{ResponseCacheLayer, ResponseCacheService};
#[doc(inline)]
pub use settings::Settings;
