// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The response cache and its per-request flow.

use std::{fmt::Debug, sync::Arc, time::Duration};

use bytes::Bytes;
use herdguard::{Coordinator, Election, LeaderToken, Role, WaitError};
use http::{HeaderName, Request, Response, StatusCode, header::CONTENT_TYPE, request, response};
use larder_tier::{CacheEntry, CacheStore, Dependencies, Expiry, SetOptions};

use crate::{
    CacheEvent, CachedResponse, Decision, MissReason, Outcome, ResponseCacheBuilder,
    builder::{DependsOnFn, EntryTtlFn, EventHook, KeyFn, ReadPolicy, WritePolicy},
    telemetry::Telemetry,
};

type Token = LeaderToken<String, CachedResponse>;

pub(crate) struct Inner<S> {
    pub(crate) store: S,
    pub(crate) coordinator: Coordinator<String, CachedResponse>,
    pub(crate) key_fn: KeyFn,
    pub(crate) depends_on: Option<DependsOnFn>,
    pub(crate) entry_ttl: EntryTtlFn,
    pub(crate) should_read: Option<ReadPolicy>,
    pub(crate) should_write: WritePolicy,
    pub(crate) pool_wait_timeout: Duration,
    pub(crate) pooling: bool,
    pub(crate) bypass_header: HeaderName,
    pub(crate) on_event: Option<EventHook>,
    pub(crate) telemetry: Telemetry,
}

/// What the cache learned about a request before deciding how to serve it.
struct Probe {
    key: String,
    snapshot: Dependencies,
    reads: bool,
}

/// How a missed request proceeds once pooling had its say.
enum Settled {
    Served(Response<Bytes>),
    Lead(Token),
    Alone,
}

/// HTTP response cache with request pooling.
///
/// For every request the cache derives a key, consults the store and, on a miss, makes
/// sure only one request per key runs the downstream computation while the others wait
/// for its response. Cloning is cheap and clones share the store and the pools.
///
/// Use [`handle`](Self::handle) to drive the cache with a closure, or wrap a tower service
/// with [`ResponseCacheLayer`](crate::ResponseCacheLayer).
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
/// use larder::ResponseCacheBuilder;
///
/// # async fn example() -> Result<(), std::convert::Infallible> {
/// let cache = ResponseCacheBuilder::in_memory().build();
///
/// let request = Request::get("/catalog").body(()).expect("valid request");
/// let response = cache
///     .handle(request, |_request| async {
///         Ok::<_, std::convert::Infallible>(Response::new(Bytes::from_static(b"items")))
///     })
///     .await?;
///
/// assert_eq!(response.body(), "items");
/// # Ok(())
/// # }
/// ```
pub struct ResponseCache<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for ResponseCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Debug> Debug for ResponseCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("name", &self.inner.telemetry.name())
            .field("store", &self.inner.store)
            .field("coordinator", &self.inner.coordinator)
            .field("pooling", &self.inner.pooling)
            .finish_non_exhaustive()
    }
}

impl<S> ResponseCache<S>
where
    S: CacheStore<CachedResponse> + 'static,
{
    /// Starts configuring a cache over `store`.
    #[must_use]
    pub fn builder(store: S) -> ResponseCacheBuilder<S> {
        ResponseCacheBuilder::new(store)
    }

    pub(crate) fn from_inner(inner: Inner<S>) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// The name reported in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.name()
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Number of keys with a pooled computation in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.coordinator.in_flight()
    }

    /// Removes the cached response for `key`.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the removal could not be carried out.
    pub async fn invalidate(&self, key: &str) -> Result<bool, larder_tier::Error> {
        self.inner.store.remove(key).await
    }

    /// Serves `request` from the cache, calling `next` to compute the response on a miss.
    ///
    /// `next` is called at most once. Its error is returned unchanged and nothing is
    /// stored; requests pooled behind this one are released to retry. Store failures never
    /// change the response: they are logged and reported as
    /// [`CacheEvent::NotStored`]. A pooled request that gives up waiting is answered with
    /// `504 Gateway Timeout`.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `next`.
    pub async fn handle<B, F, Fut, E>(&self, request: Request<B>, next: F) -> Result<Response<Bytes>, E>
    where
        B: Send,
        F: FnOnce(Request<B>) -> Fut + Send,
        Fut: Future<Output = Result<Response<Bytes>, E>> + Send,
    {
        let inner = &*self.inner;
        let (parts, body) = request.into_parts();

        let read = inner.should_read.as_ref().map_or(Decision::Allow, |policy| policy(&parts));
        let probe = Probe {
            key: (inner.key_fn)(&parts.uri, &parts),
            snapshot: inner.depends_on.as_ref().map_or_else(Dependencies::new, |depends_on| depends_on()),
            reads: read.is_allowed(),
        };

        let mut reasons = Vec::with_capacity(2);
        match read {
            Decision::Allow => {
                if let Some(cached) = self.lookup(&probe).await {
                    self.hit(&parts, &probe, &cached);
                    self.finish(&parts, &probe, Outcome::Hit);
                    return Ok(cached.to_response());
                }
                reasons.push(MissReason::NotPresent);
            }
            Decision::Deny(reason) => reasons.push(MissReason::ReadDenied(reason)),
        }

        let token = if inner.pooling {
            match self.settle(&parts, &probe, reasons).await {
                Settled::Served(response) => return Ok(response),
                Settled::Lead(token) => Some(token),
                Settled::Alone => None,
            }
        } else {
            self.miss(&parts, &probe, reasons);
            None
        };

        self.compute(parts, body, probe, token, next).await
    }

    /// Joins or leads the pool for the request's key.
    async fn settle(&self, parts: &request::Parts, probe: &Probe, reasons: Vec<MissReason>) -> Settled {
        let inner = &*self.inner;

        if parts.headers.contains_key(&inner.bypass_header) {
            let busy = match inner.coordinator.try_become_leader(probe.key.clone()) {
                Election::Leader(token) => {
                    self.miss(parts, probe, reasons);
                    return Settled::Lead(token);
                }
                Election::Busy { waiters } => waiters,
            };

            self.miss(parts, probe, reasons);
            tracing::debug!(
                cache.name = inner.telemetry.name(),
                cache.key = %probe.key,
                pool.waiters = busy,
                "cache.pool_bypassed"
            );
            if let Some(cached) = self.lookup(probe).await {
                self.hit(parts, probe, &cached);
                self.finish(parts, probe, Outcome::Hit);
                return Settled::Served(cached.to_response());
            }
            return Settled::Alone;
        }

        let mut reasons = Some(reasons);
        loop {
            let waiter = match inner.coordinator.enter(probe.key.clone()) {
                Role::Leader(token) => {
                    if let Some(reasons) = reasons.take() {
                        self.miss(parts, probe, reasons);
                    }
                    return Settled::Lead(token);
                }
                Role::Follower(waiter) => waiter,
            };

            if let Some(mut reasons) = reasons.take() {
                let waiters = inner.coordinator.waiting(&probe.key).unwrap_or(1);
                reasons.push(MissReason::Pooled { waiters });
                self.miss(parts, probe, reasons);
            }

            match waiter.wait(inner.pool_wait_timeout).await {
                Ok(cached) => {
                    self.finish(parts, probe, Outcome::Pooled);
                    return Settled::Served(cached.to_response());
                }
                Err(WaitError::TimedOut) => {
                    self.finish(parts, probe, Outcome::TimedOut);
                    return Settled::Served(gateway_timeout());
                }
                Err(WaitError::Abandoned | WaitError::Vacant) => {
                    if let Some(cached) = self.lookup(probe).await {
                        self.hit(parts, probe, &cached);
                        self.finish(parts, probe, Outcome::Hit);
                        return Settled::Served(cached.to_response());
                    }
                }
            }
        }
    }

    /// Runs the downstream computation, stores its response and publishes it to the pool.
    async fn compute<B, F, Fut, E>(
        &self,
        parts: request::Parts,
        body: B,
        probe: Probe,
        token: Option<Token>,
        next: F,
    ) -> Result<Response<Bytes>, E>
    where
        B: Send,
        F: FnOnce(Request<B>) -> Fut + Send,
        Fut: Future<Output = Result<Response<Bytes>, E>> + Send,
    {
        // A previous leader may have stored the response between our miss and election.
        let token = match token {
            Some(token) => match self.lookup(&probe).await {
                Some(cached) => {
                    self.hit(&parts, &probe, &cached);
                    self.publish(&parts, &probe, token, cached.clone());
                    self.finish(&parts, &probe, Outcome::Hit);
                    return Ok(cached.to_response());
                }
                None => Some(token),
            },
            None => None,
        };

        let response = match next(Request::from_parts(parts.clone(), body)).await {
            Ok(response) => response,
            Err(error) => {
                self.finish(&parts, &probe, Outcome::Failed);
                drop(token);
                return Err(error);
            }
        };

        let (response_parts, body) = response.into_parts();
        let cached = CachedResponse::from_parts(&response_parts, body.clone());

        self.write(&parts, &response_parts, &probe, cached.clone()).await;
        if let Some(token) = token {
            self.publish(&parts, &probe, token, cached);
        }
        self.finish(&parts, &probe, Outcome::Computed);

        Ok(Response::from_parts(response_parts, body))
    }

    async fn write(&self, parts: &request::Parts, response: &response::Parts, probe: &Probe, cached: CachedResponse) {
        let inner = &*self.inner;
        let key = probe.key.clone();

        let event = match (inner.should_write)(parts, response) {
            Decision::Deny(reason) => CacheEvent::NotStored { key, reason },
            Decision::Allow => {
                let mut options = SetOptions::new()
                    .ttl((inner.entry_ttl)(parts))
                    .dependencies(probe.snapshot.clone())
                    .metadata("status", response.status.as_u16());
                if let Some(content_type) = response.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()) {
                    options = options.metadata("content_type", content_type);
                }

                match inner.store.set(&probe.key, cached, options).await {
                    Ok(entry) => CacheEvent::Stored {
                        key,
                        ttl: entry.expiry().map(Expiry::ttl),
                    },
                    Err(error) => {
                        tracing::warn!(
                            cache.name = inner.telemetry.name(),
                            cache.key = %probe.key,
                            error = %error,
                            "cache.store_failed"
                        );
                        CacheEvent::NotStored {
                            key,
                            reason: Some(error.to_string().into()),
                        }
                    }
                }
            }
        };

        self.emit(parts, event);
    }

    async fn lookup(&self, probe: &Probe) -> Option<CachedResponse> {
        if !probe.reads {
            return None;
        }
        self.inner
            .store
            .get(&probe.key, Some(&probe.snapshot))
            .await
            .map(CacheEntry::into_value)
    }

    fn publish(&self, parts: &request::Parts, probe: &Probe, token: Token, cached: CachedResponse) {
        let waiters = token.resolve(cached);
        self.emit(
            parts,
            CacheEvent::PoolSend {
                key: probe.key.clone(),
                waiters,
            },
        );
    }

    fn hit(&self, parts: &request::Parts, probe: &Probe, cached: &CachedResponse) {
        self.emit(
            parts,
            CacheEvent::Hit {
                key: probe.key.clone(),
                status: cached.status(),
            },
        );
    }

    fn miss(&self, parts: &request::Parts, probe: &Probe, reasons: Vec<MissReason>) {
        self.emit(
            parts,
            CacheEvent::Miss {
                key: probe.key.clone(),
                reasons,
            },
        );
    }

    fn finish(&self, parts: &request::Parts, probe: &Probe, outcome: Outcome) {
        self.emit(
            parts,
            CacheEvent::Finished {
                key: probe.key.clone(),
                outcome,
            },
        );
    }

    fn emit(&self, parts: &request::Parts, event: CacheEvent) {
        self.inner.telemetry.record(&event);
        if let Some(hook) = &self.inner.on_event {
            hook(parts, &event);
        }
    }
}

/// Answer for a pooled request that gave up waiting on its leader.
fn gateway_timeout() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::GATEWAY_TIMEOUT;
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use larder_tier::testing::MockStore;

    use super::*;

    type Events = Arc<Mutex<Vec<CacheEvent>>>;

    fn recording_cache(store: MockStore<CachedResponse>) -> (ResponseCache<MockStore<CachedResponse>>, Events) {
        let events = Events::default();
        let sink = Arc::clone(&events);
        let cache = ResponseCache::builder(store)
            .key_fn(|uri, _| uri.path().to_owned())
            .on_event(move |_, event| sink.lock().expect("not poisoned").push(event.clone()))
            .build();
        (cache, events)
    }

    fn ok(body: &'static str) -> Response<Bytes> {
        Response::new(Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn gateway_timeout_is_empty() {
        let response = gateway_timeout();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn denied_read_skips_the_store_lookup() {
        let store = MockStore::new();
        let events = Events::default();
        let sink = Arc::clone(&events);
        let cache = ResponseCache::builder(store.clone())
            .key_fn(|uri, _| uri.path().to_owned())
            .should_read(|_| Decision::deny("private"))
            .on_event(move |_, event| sink.lock().expect("not poisoned").push(event.clone()))
            .build();

        let request = Request::get("/a").body(()).expect("valid request");
        let response = cache
            .handle(request, |_| async { Ok::<_, ()>(ok("fresh")) })
            .await
            .expect("downstream succeeds");

        assert_eq!(response.body(), "fresh");
        assert!(store.operations().iter().all(|op| !matches!(op, larder_tier::testing::StoreOp::Get { .. })));
        assert_eq!(
            events.lock().expect("not poisoned")[0],
            CacheEvent::Miss {
                key: "/a".to_owned(),
                reasons: vec![MissReason::ReadDenied(Some("private".into()))],
            }
        );
    }

    #[tokio::test]
    async fn stored_entry_carries_status_and_content_type() {
        let store = MockStore::new();
        let (cache, _events) = recording_cache(store.clone());

        let request = Request::get("/a").body(()).expect("valid request");
        cache
            .handle(request, |_| async {
                let mut response = ok("{}");
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
                Ok::<_, ()>(response)
            })
            .await
            .expect("downstream succeeds");

        let entry = store.get("/a", None).await.expect("response was stored");
        assert_eq!(entry.metadata()["status"], 200);
        assert_eq!(entry.metadata()["content_type"], "application/json");
        assert_eq!(entry.expiry().map(Expiry::ttl), Some(crate::settings::DEFAULT_ENTRY_TTL));
    }

    #[tokio::test]
    async fn failed_downstream_stores_nothing_and_finishes_as_failed() {
        let store = MockStore::new();
        let (cache, events) = recording_cache(store.clone());

        let request = Request::get("/a").body(()).expect("valid request");
        let result = cache.handle(request, |_| async { Err::<Response<Bytes>, _>("boom") }).await;

        assert_eq!(result.expect_err("downstream fails"), "boom");
        assert_eq!(store.set_count(), 0);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(
            events.lock().expect("not poisoned").last(),
            Some(&CacheEvent::Finished {
                key: "/a".to_owned(),
                outcome: Outcome::Failed,
            })
        );
        assert_eq!(events.lock().expect("not poisoned").len(), 2);
    }

    #[tokio::test]
    async fn bypass_recheck_hit_is_reported_as_a_hit() {
        let store = MockStore::new();
        let (cache, events) = recording_cache(store.clone());
        store
            .set("/a", CachedResponse::from_response(&ok("stored")), SetOptions::new())
            .await
            .expect("set succeeds");

        // The first read misses, the re-check after finding the pool busy hits.
        let first_read = std::sync::atomic::AtomicBool::new(true);
        store.fail_when(move |op| {
            matches!(op, larder_tier::testing::StoreOp::Get { .. }) && first_read.swap(false, std::sync::atomic::Ordering::SeqCst)
        });
        let Election::Leader(token) = cache.inner.coordinator.try_become_leader("/a".to_owned()) else {
            panic!("no pool is running yet");
        };

        let request = Request::get("/a")
            .header(crate::settings::DEFAULT_BYPASS_HEADER, "1")
            .body(())
            .expect("valid request");
        let response = cache
            .handle(request, |_| async { Ok::<_, ()>(ok("computed")) })
            .await
            .expect("downstream succeeds");
        drop(token);

        assert_eq!(response.body(), "stored");
        let kinds: Vec<_> = events.lock().expect("not poisoned").iter().map(CacheEvent::kind).collect();
        assert_eq!(kinds, [crate::EventKind::Miss, crate::EventKind::Hit, crate::EventKind::Finished]);
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let store = MockStore::new();
        let (cache, _events) = recording_cache(store.clone());

        let request = Request::get("/a").body(()).expect("valid request");
        cache
            .handle(request, |_| async { Ok::<_, ()>(ok("x")) })
            .await
            .expect("downstream succeeds");

        assert!(cache.invalidate("/a").await.expect("remove succeeds"));
        assert!(!store.contains_key("/a"));
    }
}
