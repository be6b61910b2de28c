// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The longest time-to-live a store accepts.
///
/// Deferred eviction is driven by millisecond timers whose range is that of a signed 32-bit
/// integer (`2^31 - 1` milliseconds, a little under 25 days). Longer durations are rejected
/// instead of being truncated into a premature eviction.
pub const MAX_TTL: Duration = Duration::from_millis(i32::MAX as u64);

/// Absolute expiry data computed when an entry is written.
///
/// # Examples
///
/// ```
/// use larder_tier::Expiry;
/// use std::time::{Duration, SystemTime};
///
/// let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
/// let expiry = Expiry::after(Some(Duration::from_secs(60)), now)?.unwrap();
///
/// assert_eq!(expiry.ttl(), Duration::from_secs(60));
/// assert_eq!(expiry.expires_at(), now + Duration::from_secs(60));
/// assert_eq!(expiry.remaining_at(now + Duration::from_secs(30)), Duration::from_secs(30));
///
/// // A zero or absent time-to-live means "never expires by time".
/// assert!(Expiry::after(Some(Duration::ZERO), now)?.is_none());
/// assert!(Expiry::after(None, now)?.is_none());
/// # Ok::<(), larder_tier::Error>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    #[serde(rename = "ttl_ms", with = "millis")]
    ttl: Duration,
    #[serde(rename = "expires_at_ms", with = "unix_millis")]
    expires_at: SystemTime,
    enabled: bool,
}

impl Expiry {
    /// Computes the expiry of an entry written at `now` with the given time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTtl`] when `ttl` exceeds [`MAX_TTL`].
    pub fn after(ttl: Option<Duration>, now: SystemTime) -> Result<Option<Self>> {
        let Some(ttl) = ttl.filter(|ttl| !ttl.is_zero()) else {
            return Ok(None);
        };

        if ttl > MAX_TTL {
            return Err(Error::InvalidTtl(ttl));
        }

        let expires_at = now.checked_add(ttl).ok_or(Error::InvalidTtl(ttl))?;
        Ok(Some(Self {
            ttl,
            expires_at,
            enabled: true,
        }))
    }

    /// The time-to-live the entry was written with.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The wall-clock instant after which the entry is no longer visible.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Whether time-based expiry applies to the entry at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.enabled && now >= self.expires_at
    }

    /// Time left until expiry, saturating at zero.
    #[must_use]
    pub fn remaining_at(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or_default()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, ser::Error as _};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).map_err(S::Error::custom)?;
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod unix_millis {
    use std::time::{Duration, SystemTime};

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};

    pub(super) fn serialize<S: Serializer>(value: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let since_epoch = value.duration_since(SystemTime::UNIX_EPOCH).map_err(S::Error::custom)?;
        let millis = u64::try_from(since_epoch.as_millis()).map_err(S::Error::custom)?;
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        SystemTime::UNIX_EPOCH
            .checked_add(Duration::from_millis(millis))
            .ok_or_else(|| D::Error::custom("expiry instant out of range"))
    }
}
