// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring a response cache.

use std::{borrow::Cow, fmt::Debug, sync::Arc, time::Duration};

use http::{HeaderName, Uri, request, response};
use larder_tier::{CacheStore, Dependencies};

use crate::{
    CacheEvent, CachedResponse, ConfigError, Decision, ResponseCache, Settings,
    cache::Inner,
    settings::{DEFAULT_BYPASS_HEADER, DEFAULT_ENTRY_TTL, DEFAULT_NAME, DEFAULT_POOL_WAIT_TIMEOUT},
    telemetry::Telemetry,
};

pub(crate) type KeyFn = Arc<dyn Fn(&Uri, &request::Parts) -> String + Send + Sync>;
pub(crate) type DependsOnFn = Arc<dyn Fn() -> Dependencies + Send + Sync>;
pub(crate) type EntryTtlFn = Arc<dyn Fn(&request::Parts) -> Duration + Send + Sync>;
pub(crate) type ReadPolicy = Arc<dyn Fn(&request::Parts) -> Decision + Send + Sync>;
pub(crate) type WritePolicy = Arc<dyn Fn(&request::Parts, &response::Parts) -> Decision + Send + Sync>;
pub(crate) type EventHook = Arc<dyn Fn(&request::Parts, &CacheEvent) + Send + Sync>;

/// Stable default key: the hex `xxh3` hash of the full request URI.
pub(crate) fn uri_hash_key(uri: &Uri, _parts: &request::Parts) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(uri.to_string().as_bytes()))
}

/// Stores successful responses only.
pub(crate) fn store_successes(_request: &request::Parts, response: &response::Parts) -> Decision {
    if response.status.is_success() {
        Decision::Allow
    } else {
        Decision::deny(format!("status {} is not cacheable", response.status.as_u16()))
    }
}

/// Builder for [`ResponseCache`].
///
/// Created with [`ResponseCache::builder`]. Every setting has a default, so
/// `ResponseCache::builder(store).build()` is a working cache:
///
/// | Setting | Default |
/// |---|---|
/// | [`key_fn`](Self::key_fn) | hex `xxh3` hash of the request URI |
/// | [`depends_on`](Self::depends_on) | empty snapshot |
/// | [`entry_ttl`](Self::entry_ttl) | one hour |
/// | [`should_read`](Self::should_read) | always read |
/// | [`should_write`](Self::should_write) | store `2xx` responses |
/// | [`pool_wait_timeout`](Self::pool_wait_timeout) | 20 seconds |
/// | [`pooling`](Self::pooling) | enabled |
/// | [`bypass_header`](Self::bypass_header) | `x-larder-no-pool` |
///
/// # Examples
///
/// ```
/// use larder::{Decision, ResponseCache};
/// use larder_memory::InMemoryStore;
/// use std::time::Duration;
///
/// let cache = ResponseCache::builder(InMemoryStore::new())
///     .name("catalog")
///     .entry_ttl(|_| Duration::from_secs(300))
///     .should_read(|parts| Decision::from(parts.method == http::Method::GET))
///     .pool_wait_timeout(Duration::from_secs(5))
///     .build();
/// # let _ = cache;
/// ```
pub struct ResponseCacheBuilder<S> {
    store: S,
    name: Cow<'static, str>,
    key_fn: KeyFn,
    depends_on: Option<DependsOnFn>,
    entry_ttl: EntryTtlFn,
    should_read: Option<ReadPolicy>,
    should_write: WritePolicy,
    pool_wait_timeout: Duration,
    pooling: bool,
    bypass_header: HeaderName,
    on_event: Option<EventHook>,
    #[cfg(feature = "metrics")]
    meter: Option<opentelemetry::metrics::Meter>,
}

impl<S: Debug> Debug for ResponseCacheBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCacheBuilder")
            .field("store", &self.store)
            .field("name", &self.name)
            .field("pool_wait_timeout", &self.pool_wait_timeout)
            .field("pooling", &self.pooling)
            .field("bypass_header", &self.bypass_header)
            .finish_non_exhaustive()
    }
}

impl<S> ResponseCacheBuilder<S>
where
    S: CacheStore<CachedResponse> + 'static,
{
    pub(crate) fn new(store: S) -> Self {
        Self {
            store,
            name: Cow::Borrowed(DEFAULT_NAME),
            key_fn: Arc::new(uri_hash_key),
            depends_on: None,
            entry_ttl: Arc::new(|_| DEFAULT_ENTRY_TTL),
            should_read: None,
            should_write: Arc::new(store_successes),
            pool_wait_timeout: DEFAULT_POOL_WAIT_TIMEOUT,
            pooling: true,
            bypass_header: HeaderName::from_static(DEFAULT_BYPASS_HEADER),
            on_event: None,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Sets the name reported in logs and metrics.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Cow::Borrowed(name);
        self
    }

    /// Sets the function that derives the cache key of a request.
    ///
    /// Requests that must not share a cached response need distinct keys.
    #[must_use]
    pub fn key_fn(mut self, key_fn: impl Fn(&Uri, &request::Parts) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Sets the function producing the dependency snapshot.
    ///
    /// The snapshot is taken once per request. It becomes the fingerprint of any entry the
    /// request stores, and an entry whose fingerprint differs from the current snapshot is
    /// invalidated on read.
    #[must_use]
    pub fn depends_on(mut self, depends_on: impl Fn() -> Dependencies + Send + Sync + 'static) -> Self {
        self.depends_on = Some(Arc::new(depends_on));
        self
    }

    /// Sets the time-to-live of stored responses. A zero duration stores without expiry.
    #[must_use]
    pub fn entry_ttl(mut self, entry_ttl: impl Fn(&request::Parts) -> Duration + Send + Sync + 'static) -> Self {
        self.entry_ttl = Arc::new(entry_ttl);
        self
    }

    /// Sets the policy deciding whether a request may be served from the store.
    #[must_use]
    pub fn should_read(mut self, policy: impl Fn(&request::Parts) -> Decision + Send + Sync + 'static) -> Self {
        self.should_read = Some(Arc::new(policy));
        self
    }

    /// Sets the policy deciding whether a computed response is stored.
    #[must_use]
    pub fn should_write(
        mut self,
        policy: impl Fn(&request::Parts, &response::Parts) -> Decision + Send + Sync + 'static,
    ) -> Self {
        self.should_write = Arc::new(policy);
        self
    }

    /// Sets how long a pooled request waits for its leader before answering
    /// `504 Gateway Timeout`.
    #[must_use]
    pub fn pool_wait_timeout(mut self, timeout: Duration) -> Self {
        self.pool_wait_timeout = timeout;
        self
    }

    /// Enables or disables pooling of concurrent misses.
    #[must_use]
    pub fn pooling(mut self, enabled: bool) -> Self {
        self.pooling = enabled;
        self
    }

    /// Sets the request header that opts a request out of pooling.
    #[must_use]
    pub fn bypass_header(mut self, header: HeaderName) -> Self {
        self.bypass_header = header;
        self
    }

    /// Registers a callback invoked for every [`CacheEvent`].
    ///
    /// The callback runs inline on the request path and should return quickly.
    #[must_use]
    pub fn on_event(mut self, hook: impl Fn(&request::Parts, &CacheEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(hook));
        self
    }

    /// Counts cache events with the given meter provider.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn metrics(mut self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        self.meter = Some(crate::telemetry::metrics::create_meter(meter_provider));
        self
    }

    /// Applies static settings, replacing the name, time-to-live, pool timeout, pooling
    /// switch and bypass header.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bypass header is not a valid header name or the
    /// time-to-live exceeds [`larder_tier::MAX_TTL`].
    pub fn settings(mut self, settings: &Settings) -> Result<Self, ConfigError> {
        self.bypass_header = settings.validate()?;
        let ttl = settings.entry_ttl();
        self.name = Cow::Owned(settings.name.clone());
        self.entry_ttl = Arc::new(move |_| ttl);
        self.pool_wait_timeout = settings.pool_wait_timeout();
        self.pooling = settings.pooling;
        Ok(self)
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> ResponseCache<S> {
        let telemetry = Telemetry::new(self.name);
        #[cfg(feature = "metrics")]
        let telemetry = match &self.meter {
            Some(meter) => telemetry.with_meter(meter),
            None => telemetry,
        };

        ResponseCache::from_inner(Inner {
            store: self.store,
            coordinator: herdguard::Coordinator::new(),
            key_fn: self.key_fn,
            depends_on: self.depends_on,
            entry_ttl: self.entry_ttl,
            should_read: self.should_read,
            should_write: self.should_write,
            pool_wait_timeout: self.pool_wait_timeout,
            pooling: self.pooling,
            bypass_header: self.bypass_header,
            on_event: self.on_event,
            telemetry,
        })
    }
}

#[cfg(feature = "memory")]
impl ResponseCacheBuilder<larder_memory::InMemoryStore<CachedResponse>> {
    /// Creates a builder over a fresh process-local store.
    #[cfg_attr(docsrs, doc(cfg(feature = "memory")))]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(larder_memory::InMemoryStore::new())
    }
}
