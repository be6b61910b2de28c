// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache store operations.

use std::time::Duration;

use thiserror::Error as ThisError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from a cache store operation.
///
/// Only [`Error::InvalidTtl`] is a caller mistake. The other variants describe a backend
/// that could not serve the request; stores turn them into misses on reads and hand them
/// back from writes so the caller can report them without failing its own work.
///
/// # Example
///
/// ```
/// use larder_tier::Error;
///
/// let error = Error::unavailable("connection refused");
/// assert!(error.is_backend_failure());
/// ```
#[derive(Debug, ThisError)]
pub enum Error {
    /// The requested time-to-live cannot be represented by the backend's timers.
    #[error("time-to-live of {0:?} exceeds the maximum supported timer duration")]
    InvalidTtl(Duration),

    /// The backend could not be reached or refused the operation.
    #[error("cache backend unavailable")]
    Unavailable(#[source] BoxError),

    /// Stored data could not be encoded or decoded.
    #[error("cache record is malformed")]
    Malformed(#[source] BoxError),
}

impl Error {
    /// Creates an [`Error::Unavailable`] from any error-like cause.
    pub fn unavailable(cause: impl Into<BoxError>) -> Self {
        Self::Unavailable(cause.into())
    }

    /// Creates an [`Error::Malformed`] from any error-like cause.
    pub fn malformed(cause: impl Into<BoxError>) -> Self {
        Self::Malformed(cause.into())
    }

    /// Returns `true` for failures of the backend rather than of the caller.
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Malformed(_))
    }
}

/// A specialized [`Result`] type for cache store operations.
pub type Result<T> = std::result::Result<T, Error>;
