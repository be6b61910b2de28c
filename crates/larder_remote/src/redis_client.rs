// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{SystemTime, UNIX_EPOCH};

use larder_tier::Error;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::client::RemoteClient;

/// A [`RemoteClient`] for Redis.
///
/// Records are plain string values. Deadlines are applied with `PEXPIREAT` in the same
/// `MULTI`/`EXEC` transaction as the `SET`, so a record is never visible without its
/// expiry. The connection manager reconnects on its own; while it cannot, every call
/// reports [`Error::Unavailable`].
#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}

impl RedisClient {
    /// Wraps an established connection manager.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the URL is invalid or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(Error::unavailable)?;
        let connection = ConnectionManager::new(client).await.map_err(Error::unavailable)?;
        Ok(Self::new(connection))
    }
}

fn unix_millis(instant: SystemTime) -> Result<i64, Error> {
    let since_epoch = instant.duration_since(UNIX_EPOCH).map_err(Error::malformed)?;
    i64::try_from(since_epoch.as_millis()).map_err(Error::malformed)
}

impl RemoteClient for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut connection = self.connection.clone();
        connection.get(key).await.map_err(Error::unavailable)
    }

    async fn set(&self, key: &str, payload: Vec<u8>, expire_at: Option<SystemTime>) -> Result<(), Error> {
        let mut pipeline = redis::pipe();
        pipeline.atomic().set(key, payload).ignore();
        if let Some(expire_at) = expire_at {
            pipeline.pexpire_at(key, unix_millis(expire_at)?).ignore();
        }

        let mut connection = self.connection.clone();
        pipeline.query_async::<()>(&mut connection).await.map_err(Error::unavailable)
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut connection = self.connection.clone();
        connection.exists(key).await.map_err(Error::unavailable)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let mut connection = self.connection.clone();
        let removed: u64 = connection.del(key).await.map_err(Error::unavailable)?;
        Ok(removed > 0)
    }
}
