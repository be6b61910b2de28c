// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::HeaderName;
use larder_tier::MAX_TTL;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

pub(crate) const DEFAULT_NAME: &str = "larder";
pub(crate) const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(60 * 60);
pub(crate) const DEFAULT_POOL_WAIT_TIMEOUT: Duration = Duration::from_secs(20);
pub(crate) const DEFAULT_BYPASS_HEADER: &str = "x-larder-no-pool";

/// Static cache configuration, loadable from any serde format.
///
/// Every field is optional in the serialized form and falls back to the default shown on
/// it. Apply the settings with
/// [`ResponseCacheBuilder::settings`](crate::ResponseCacheBuilder::settings).
///
/// # Examples
///
/// ```
/// use larder::Settings;
/// use std::time::Duration;
///
/// let settings: Settings = serde_json::from_str(r#"{ "entry_ttl_secs": 300, "pooling": false }"#)?;
///
/// assert_eq!(settings.entry_ttl(), Duration::from_secs(300));
/// assert_eq!(settings.pool_wait_timeout(), Duration::from_secs(20));
/// assert!(!settings.pooling);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Name reported in logs and metrics. Default `"larder"`.
    pub name: String,
    /// Time-to-live of stored responses, in seconds. Zero stores without expiry.
    /// Default one hour.
    pub entry_ttl_secs: u64,
    /// How long a pooled request waits for its leader, in milliseconds. Default 20 seconds.
    pub pool_wait_timeout_ms: u64,
    /// Whether concurrent misses for one key share a single computation. Default `true`.
    pub pooling: bool,
    /// Request header that opts a request out of pooling. Default `x-larder-no-pool`.
    pub bypass_header: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            entry_ttl_secs: DEFAULT_ENTRY_TTL.as_secs(),
            pool_wait_timeout_ms: 20_000,
            pooling: true,
            bypass_header: DEFAULT_BYPASS_HEADER.to_owned(),
        }
    }
}

impl Settings {
    /// The entry time-to-live as a duration.
    #[must_use]
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    /// The pool wait timeout as a duration.
    #[must_use]
    pub fn pool_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_wait_timeout_ms)
    }

    /// Checks the settings and parses the bypass header name.
    pub(crate) fn validate(&self) -> Result<HeaderName, ConfigError> {
        let ttl = self.entry_ttl();
        if ttl > MAX_TTL {
            return Err(ConfigError::EntryTtlTooLong { ttl });
        }

        HeaderName::try_from(self.bypass_header.as_str()).map_err(|source| ConfigError::InvalidBypassHeader {
            name: self.bypass_header.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_builder_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.entry_ttl(), DEFAULT_ENTRY_TTL);
        assert_eq!(settings.pool_wait_timeout(), DEFAULT_POOL_WAIT_TIMEOUT);
        assert_eq!(settings.validate().expect("defaults are valid"), DEFAULT_BYPASS_HEADER);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_json::from_str("{}").expect("deserializes");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<Settings>(r#"{ "ttl": 5 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_header_is_reported() {
        let settings = Settings {
            bypass_header: "not a header".to_owned(),
            ..Settings::default()
        };

        let error = settings.validate().expect_err("header has a space");
        assert!(matches!(error, ConfigError::InvalidBypassHeader { ref name, .. } if name == "not a header"));
    }

    #[test]
    fn overlong_ttl_is_reported() {
        let settings = Settings {
            entry_ttl_secs: MAX_TTL.as_secs() + 1,
            ..Settings::default()
        };

        assert!(matches!(settings.validate(), Err(ConfigError::EntryTtlTooLong { .. })));
    }
}
