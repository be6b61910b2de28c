// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A snapshot of external values whose change invalidates a cached entry.
///
/// The snapshot is an ordered sequence of JSON values. Two snapshots are equal when their
/// sequences are deep-equal element by element. Objects compare by their key/value pairs,
/// so the order in which a caller inserted keys never produces a spurious change.
///
/// # Examples
///
/// ```
/// use larder_tier::Dependencies;
/// use serde_json::json;
///
/// let a = Dependencies::from_iter([json!({ "user": 7, "locale": "en" }), json!(3)]);
/// let b = Dependencies::from_iter([json!({ "locale": "en", "user": 7 }), json!(3)]);
/// assert_eq!(a, b);
///
/// let c = Dependencies::from_iter([json!(3), json!({ "user": 7, "locale": "en" })]);
/// assert_ne!(a, c);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dependencies(Vec<Value>);

impl Dependencies {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to the snapshot.
    #[must_use]
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Returns the values in order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Returns the number of values in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the snapshot holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Into<Value>> FromIterator<T> for Dependencies {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Value>> for Dependencies {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}
