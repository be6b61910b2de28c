// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-process remote client for tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use larder_tier::Error;
use parking_lot::Mutex;

use crate::client::RemoteClient;

#[derive(Debug)]
struct Record {
    payload: Vec<u8>,
    expire_at: Option<SystemTime>,
}

impl Record {
    fn is_live(&self, now: SystemTime) -> bool {
        self.expire_at.is_none_or(|deadline| now < deadline)
    }
}

/// A [`RemoteClient`] backed by a map in the current process.
///
/// Behaves like a key-value service with native expire-at support: records past their
/// deadline are invisible. [`disconnect`](Self::disconnect) makes every call fail with
/// [`Error::Unavailable`] until [`reconnect`](Self::reconnect) is called. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryClient {
    records: Arc<Mutex<HashMap<String, Record>>>,
    disconnected: Arc<AtomicBool>,
}

impl MemoryClient {
    /// Creates an empty, connected client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the backend were unreachable.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    /// Restores connectivity.
    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::Release);
    }

    /// Stores `payload` under `key` without expiry, bypassing the connectivity check.
    pub fn insert_raw(&self, key: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.records.lock().insert(
            key.into(),
            Record {
                payload: payload.into(),
                expire_at: None,
            },
        );
    }

    /// Returns the raw payload under `key`, ignoring expiry and connectivity.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.records.lock().get(key).map(|record| record.payload.clone())
    }

    /// Returns the deadline the backend was given for `key`.
    #[must_use]
    pub fn expire_at(&self, key: &str) -> Option<SystemTime> {
        self.records.lock().get(key).and_then(|record| record.expire_at)
    }

    /// Returns the keys currently held, including expired ones, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.records.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn connected(&self) -> Result<(), Error> {
        if self.disconnected.load(Ordering::Acquire) {
            Err(Error::unavailable("memory client is disconnected"))
        } else {
            Ok(())
        }
    }
}

impl RemoteClient for MemoryClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.connected()?;
        let now = SystemTime::now();
        Ok(self
            .records
            .lock()
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.payload.clone()))
    }

    async fn set(&self, key: &str, payload: Vec<u8>, expire_at: Option<SystemTime>) -> Result<(), Error> {
        self.connected()?;
        self.records.lock().insert(key.to_owned(), Record { payload, expire_at });
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.connected()?;
        let now = SystemTime::now();
        Ok(self.records.lock().get(key).is_some_and(|record| record.is_live(now)))
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.connected()?;
        Ok(self.records.lock().remove(key).is_some())
    }
}
