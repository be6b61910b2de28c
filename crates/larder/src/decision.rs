// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

/// Verdict of a read or write policy.
///
/// Policies may deny with or without a reason; the reason is carried into the events the
/// cache emits.
///
/// # Examples
///
/// ```
/// use larder::Decision;
///
/// assert!(Decision::from(true).is_allowed());
///
/// let denied = Decision::deny("authenticated request");
/// assert!(!denied.is_allowed());
/// assert_eq!(denied.reason(), Some("authenticated request"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead.
    #[default]
    Allow,
    /// Skip, optionally explaining why.
    Deny(Option<Cow<'static, str>>),
}

impl Decision {
    /// Denies with a reason.
    pub fn deny(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Deny(Some(reason.into()))
    }

    /// Returns `true` for [`Decision::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The reason given for a denial, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow | Self::Deny(None) => None,
            Self::Deny(Some(reason)) => Some(reason),
        }
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny(None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_denial_has_no_reason() {
        let decision = Decision::from(false);
        assert_eq!(decision, Decision::Deny(None));
        assert_eq!(decision.reason(), None);
    }

    #[test]
    fn default_allows() {
        assert!(Decision::default().is_allowed());
        assert_eq!(Decision::Allow.reason(), None);
    }
}
