//! The uniform boolean-plus-reason result type for guards and mutators.
//!
//! A `Decision` is ordinary control flow, not an error: `can_purchase`,
//! `meets_requirements`, `increase` and friends all return one, and callers
//! are expected to check [`Decision::is_ok`] rather than assume success.

use serde::{Deserialize, Serialize};

/// Outcome of a rule query or mutation attempt.
///
/// Failures carry a human-readable `reason`. Hypothetical queries may also
/// carry an `amount` ("how much of this *could* be done"), and option-bearing
/// features signal a missing option through `needs_option` so a UI can prompt
/// for one instead of surfacing an opaque failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub success: bool,
    /// True when the only thing missing from the request is an option value.
    #[serde(default)]
    pub needs_option: bool,
    /// If `success` is false, explains why.
    #[serde(default)]
    pub reason: Option<String>,
    /// For hypothetical queries, how much the action can be performed.
    #[serde(default)]
    pub amount: Option<i64>,
}

impl Decision {
    /// A plain success with no annotations.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Success carrying a resulting amount (e.g. ranks now held).
    pub fn ok_amount(amount: i64) -> Self {
        Self {
            success: true,
            amount: Some(amount),
            ..Self::default()
        }
    }

    /// A failure with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// A failure with a reason and the largest amount that *would* succeed.
    pub fn deny_amount(reason: impl Into<String>, amount: i64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::deny(reason)
        }
    }

    /// A failure whose only missing piece is an option value.
    pub fn needs_option() -> Self {
        Self {
            success: false,
            needs_option: true,
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }

    /// Failure reason, or a placeholder when none was recorded.
    pub fn reason_or_unspecified(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or("[unspecified failure reason]")
    }
}
