// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Why a follower did not receive the leader's result.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The follower's own timeout elapsed first. The leader is unaffected.
    #[error("timed out waiting for the pooled computation")]
    TimedOut,

    /// The leader went away without publishing a result.
    #[error("the leader abandoned the pooled computation")]
    Abandoned,

    /// There was no pool to join for the key.
    #[error("no computation is in flight for the key")]
    Vacant,
}
