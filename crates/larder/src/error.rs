// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::header::InvalidHeaderName;
use thiserror::Error;

/// Errors produced while applying [`Settings`](crate::Settings).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The bypass header is not a valid HTTP header name.
    #[error("invalid bypass header name {name:?}")]
    InvalidBypassHeader {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        #[source]
        source: InvalidHeaderName,
    },

    /// The entry time-to-live exceeds what stores accept.
    #[error("entry time-to-live of {ttl:?} exceeds the maximum of {max:?}", max = larder_tier::MAX_TTL)]
    EntryTtlTooLong {
        /// The rejected time-to-live.
        ttl: Duration,
    },
}
