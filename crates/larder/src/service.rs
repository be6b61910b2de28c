// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tower integration.

use std::{
    fmt::Debug,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::{Request, Response};
use larder_tier::CacheStore;
use tower_layer::Layer;
use tower_service::Service;

use crate::{CachedResponse, ResponseCache};

/// Applies a [`ResponseCache`] to a tower service.
///
/// Every service produced by the layer shares the cache, so requests that arrive through
/// different clones of the service are pooled together.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
/// use larder::{ResponseCacheBuilder, ResponseCacheLayer};
/// use tower::{ServiceBuilder, ServiceExt, service_fn};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = ResponseCacheBuilder::in_memory().build();
///
/// let service = ServiceBuilder::new()
///     .layer(ResponseCacheLayer::new(cache))
///     .service(service_fn(|_request: Request<()>| async {
///         Ok::<_, std::convert::Infallible>(Response::new(Bytes::from_static(b"fresh")))
///     }));
///
/// let response = service.oneshot(Request::get("/").body(())?).await?;
/// assert_eq!(response.body(), "fresh");
/// # Ok(())
/// # }
/// ```
pub struct ResponseCacheLayer<S> {
    cache: ResponseCache<S>,
}

impl<S> ResponseCacheLayer<S> {
    /// Creates a layer serving through `cache`.
    #[must_use]
    pub fn new(cache: ResponseCache<S>) -> Self {
        Self { cache }
    }
}

impl<S> Clone for ResponseCacheLayer<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<S: Debug> Debug for ResponseCacheLayer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCacheLayer").field("cache", &self.cache).finish()
    }
}

impl<S, Inner> Layer<Inner> for ResponseCacheLayer<S> {
    type Service = ResponseCacheService<S, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        ResponseCacheService {
            cache: self.cache.clone(),
            inner,
        }
    }
}

/// Tower service produced by [`ResponseCacheLayer`].
///
/// The wrapped service is only called on a miss, and at most once per pooled key.
pub struct ResponseCacheService<S, Inner> {
    cache: ResponseCache<S>,
    inner: Inner,
}

impl<S, Inner: Clone> Clone for ResponseCacheService<S, Inner> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S: Debug, Inner: Debug> Debug for ResponseCacheService<S, Inner> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCacheService")
            .field("cache", &self.cache)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S, Inner, B> Service<Request<B>> for ResponseCacheService<S, Inner>
where
    S: CacheStore<CachedResponse> + 'static,
    Inner: Service<Request<B>, Response = Response<Bytes>> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    Inner::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<Bytes>;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        // The ready service goes with this call; a fresh clone takes its place.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let cache = self.cache.clone();

        Box::pin(async move { cache.handle(request, move |request| inner.call(request)).await })
    }
}
