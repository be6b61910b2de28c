// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pools concurrent requests for the same key behind a single leader.
//!
//! When many tasks miss a cache for the same key at once, only one of them should run the
//! expensive computation. [`Coordinator`] elects that task as the *leader* and parks every
//! later arrival as a *follower* until the leader publishes its result. Each follower waits
//! with its own timeout, so a slow leader can never hold a caller forever.
//!
//! The per-key lifecycle is `IDLE -> LEADING -> IDLE`: the first arrival creates the pool,
//! followers join it, and the pool is discarded the moment the leader resolves or goes away.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use herdguard::{Coordinator, Role};
//!
//! # async fn example() {
//! let pools = Coordinator::<String, String>::new();
//!
//! match pools.enter("user:123".to_string()) {
//!     Role::Leader(token) => {
//!         let value = "expensive_result".to_string();
//!         let served = token.resolve(value);
//!         println!("delivered to {served} waiters");
//!     }
//!     Role::Follower(waiter) => match waiter.wait(Duration::from_secs(20)).await {
//!         Ok(value) => println!("shared result: {value}"),
//!         Err(error) => println!("gave up: {error}"),
//!     },
//! }
//! # }
//! ```
//!
//! # Leader failure
//!
//! A [`LeaderToken`] that is dropped without being resolved, because its computation
//! failed, panicked or was cancelled, discards the pool right away. Every follower is woken
//! with [`WaitError::Abandoned`] and may retry, typically becoming the next leader. Follower
//! timeouts only come into play when a leader hangs.

mod coordinator;
mod error;
mod token;

pub use coordinator::{Coordinator, Election, Role};
pub use error::WaitError;
pub use token::{LeaderToken, Waiter};
