//! Per-purpose lifecycle policy.

use chrono::Duration;

use attest_core::Purpose;

/// How a purpose's tokens live and die.
///
/// Defaults per purpose come from [`PurposePolicy::for_purpose`]; services
/// accept overrides at construction for tests and unusual deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurposePolicy {
    /// How long a freshly issued token stays valid.
    pub ttl: Duration,

    /// Whether an expired token is silently replaced by a fresh issuance
    /// during verification. Invites never rotate; a human re-invites.
    pub allows_rotation: bool,

    /// Whether presenting an expired token for an already-confirmed subject
    /// counts as success instead of an error. True for confirmation flows
    /// where the user may click a stale link after already verifying;
    /// never true for password resets.
    pub expired_after_completion_is_success: bool,
}

impl PurposePolicy {
    /// The default policy for a purpose.
    #[must_use]
    pub fn for_purpose(purpose: Purpose) -> Self {
        match purpose {
            Purpose::EmailVerification => Self {
                ttl: Duration::hours(24),
                allows_rotation: true,
                expired_after_completion_is_success: true,
            },
            Purpose::PasswordReset => Self {
                ttl: Duration::hours(1),
                allows_rotation: true,
                expired_after_completion_is_success: false,
            },
            Purpose::SubscriberConfirm => Self {
                ttl: Duration::days(7),
                allows_rotation: true,
                expired_after_completion_is_success: true,
            },
            Purpose::OrgInvite => Self {
                ttl: Duration::days(7),
                allows_rotation: false,
                expired_after_completion_is_success: false,
            },
        }
    }
}
