// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{ops::Deref, time::SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Dependencies, Expiry};

/// Version tag stamped on every entry this crate writes.
///
/// Bump it whenever the shape of [`CacheEntry`] changes; stores treat records carrying a
/// different tag as misses and evict them.
pub const SCHEMA_VERSION: &str = "larder/1";

/// Free-form metadata stored alongside an entry.
pub type Metadata = Map<String, Value>;

/// A stored computation result together with the data that decides its visibility.
///
/// Entries are replaced wholesale; there is no partial update. An entry is visible while
/// its [`Expiry`] (if any) has not been reached and the reader's dependency snapshot
/// equals the [`fingerprint`](Self::fingerprint) taken at write time.
///
/// # Examples
///
/// ```
/// use larder_tier::{CacheEntry, Dependencies, SCHEMA_VERSION};
///
/// let entry = CacheEntry::new("greeting", "hello".to_string())
///     .with_fingerprint(Dependencies::from_iter([1]));
///
/// assert_eq!(entry.key(), "greeting");
/// assert_eq!(entry.value(), "hello");
/// assert_eq!(entry.schema_version(), SCHEMA_VERSION);
/// assert!(entry.expiry().is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    key: String,
    value: V,
    expiry: Option<Expiry>,
    fingerprint: Dependencies,
    schema_version: String,
    #[serde(default)]
    metadata: Metadata,
}

impl<V> CacheEntry<V> {
    /// Creates an entry without expiry, fingerprint or metadata.
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
            expiry: None,
            fingerprint: Dependencies::new(),
            schema_version: SCHEMA_VERSION.to_owned(),
            metadata: Metadata::new(),
        }
    }

    /// Sets the expiry data.
    #[must_use]
    pub fn with_expiry(mut self, expiry: Option<Expiry>) -> Self {
        self.expiry = expiry;
        self
    }

    /// Sets the dependency fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Dependencies) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Sets the extra metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The cache key this entry was stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the inner value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// The expiry data, if the entry expires by time.
    #[must_use]
    pub fn expiry(&self) -> Option<&Expiry> {
        self.expiry.as_ref()
    }

    /// The dependency snapshot taken when the entry was written.
    #[must_use]
    pub fn fingerprint(&self) -> &Dependencies {
        &self.fingerprint
    }

    /// The data-shape version of the writer.
    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Extra metadata supplied by the writer.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns `true` if the entry was written with the current [`SCHEMA_VERSION`].
    #[must_use]
    pub fn is_current_schema(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }

    /// Returns `true` if the entry is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|expiry| expiry.is_expired_at(now))
    }
}

impl<V> Deref for CacheEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn entry_without_expiry_never_expires() {
        let entry = CacheEntry::new("k", 1);
        assert!(!entry.is_expired_at(SystemTime::now() + Duration::from_secs(86_400 * 365)));
    }

    #[test]
    fn entry_expires_with_its_expiry() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let expiry = Expiry::after(Some(Duration::from_secs(10)), now).unwrap();
        let entry = CacheEntry::new("k", 1).with_expiry(expiry);
        assert!(!entry.is_expired_at(now + Duration::from_secs(9)));
        assert!(entry.is_expired_at(now + Duration::from_secs(10)));
    }

    #[test]
    fn foreign_schema_is_detected_after_decoding() {
        let json = serde_json::json!({
            "key": "k",
            "value": 1,
            "expiry": null,
            "fingerprint": [],
            "schema_version": "legacy",
        });
        let entry: CacheEntry<i32> = serde_json::from_value(json).unwrap();
        assert!(!entry.is_current_schema());
        assert!(entry.metadata().is_empty());
    }

    #[test]
    fn deref_exposes_value() {
        let entry = CacheEntry::new("k", String::from("abc"));
        assert_eq!(entry.len(), 3);
        assert_eq!(entry.into_value(), "abc");
    }
}
