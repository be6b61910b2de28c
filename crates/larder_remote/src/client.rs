// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{sync::Arc, time::SystemTime};

use larder_tier::Error;

/// Byte-oriented access to a remote key-value service.
///
/// Implementations map transport failures to [`Error::Unavailable`]; the store decides
/// how each failure surfaces to its own callers.
pub trait RemoteClient: Send + Sync {
    /// Reads the raw record stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Writes `payload` under `key`, replacing any previous record.
    ///
    /// When `expire_at` is given the backend must drop the record at that instant. The
    /// write and the expiry must be applied together so the record is never observable
    /// without its deadline.
    fn set(&self, key: &str, payload: Vec<u8>, expire_at: Option<SystemTime>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns whether a record is stored under `key`.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Deletes the record under `key`, returning whether one existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

impl<C: RemoteClient> RemoteClient for Arc<C> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, payload: Vec<u8>, expire_at: Option<SystemTime>) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).set(key, payload, expire_at)
    }

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        (**self).exists(key)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        (**self).delete(key)
    }
}
