// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, response::Parts};
use serde::{Deserialize, Serialize};

/// A buffered HTTP response as kept in the cache.
///
/// Status, headers and body are stored verbatim so a cached response can be replayed
/// byte for byte.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use http::{Response, StatusCode, header::CONTENT_TYPE};
/// use larder::CachedResponse;
///
/// let response = Response::builder()
///     .status(StatusCode::OK)
///     .header(CONTENT_TYPE, "text/plain")
///     .body(Bytes::from_static(b"hello"))?;
///
/// let cached = CachedResponse::from_response(&response);
/// let replayed = cached.to_response();
///
/// assert_eq!(replayed.status(), StatusCode::OK);
/// assert_eq!(replayed.headers()[CONTENT_TYPE], "text/plain");
/// assert_eq!(replayed.body(), "hello");
/// # Ok::<(), http::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    status: u16,
    headers: Vec<(String, Bytes)>,
    body: Bytes,
}

impl CachedResponse {
    /// Captures the status and headers in `parts` along with `body`.
    #[must_use]
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self {
            status: parts.status.as_u16(),
            headers: capture_headers(&parts.headers),
            body,
        }
    }

    /// Captures a complete response.
    #[must_use]
    pub fn from_response(response: &Response<Bytes>) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: capture_headers(response.headers()),
            body: response.body().clone(),
        }
    }

    /// The response status. Unrepresentable codes read back as `500`.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The response body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The first value of header `name`, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Bytes> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Rebuilds an HTTP response.
    ///
    /// Headers that no longer parse are dropped.
    #[must_use]
    pub fn to_response(&self) -> Response<Bytes> {
        let mut response = Response::new(self.body.clone());
        *response.status_mut() = self.status();

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_maybe_shared(value.clone())) else {
                tracing::debug!(header.name = name.as_str(), "cache.header_dropped");
                continue;
            };
            headers.append(name, value);
        }
        response
    }
}

fn capture_headers(headers: &HeaderMap) -> Vec<(String, Bytes)> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().to_owned(), Bytes::copy_from_slice(value.as_bytes())))
        .collect()
}
