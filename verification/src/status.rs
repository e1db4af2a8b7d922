//! Derived verification status.

use ident_types::{Timestamp, Verification, VerificationOutcome};
use serde::{Deserialize, Serialize};

use crate::StrategyLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
    Failed,
    Expired,
    Transferable,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed | Self::Expired)
    }
}

/// Compute the status of `verification` at `now`.
///
/// A completed proof stays verified after `expire_at`; every other state
/// becomes expired once the deadline passes, regardless of attempts.
pub fn status(verification: &Verification, limits: StrategyLimits, now: Timestamp) -> VerificationStatus {
    if verification.outcome == VerificationOutcome::Verified {
        return VerificationStatus::Verified;
    }
    if verification.expire_at.has_passed(now) {
        return VerificationStatus::Expired;
    }
    if verification.attempts >= limits.max_attempts {
        return VerificationStatus::Failed;
    }
    if verification.outcome == VerificationOutcome::Transferable {
        return VerificationStatus::Transferable;
    }
    VerificationStatus::Unverified
}
