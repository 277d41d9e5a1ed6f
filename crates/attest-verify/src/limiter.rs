//! Issuance ceiling for verification tokens.

use thiserror::Error;

/// Default number of issuances allowed per subject+purpose.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

/// Raised when a subject has exhausted its issuances for a purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("max attempts reached for this verification")]
pub struct AttemptsExceeded;

/// Enforces the per-subject issuance ceiling.
///
/// The ceiling counts every issuance ever made for a subject+purpose;
/// expiring or rotating a token does not hand back budget. Clearing the
/// counter is an out-of-band operation (support tooling), not something the
/// engine does.
#[derive(Debug, Clone, Copy)]
pub struct AttemptLimiter {
    ceiling: i64,
}

impl Default for AttemptLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl AttemptLimiter {
    /// Create a limiter with an explicit ceiling.
    #[must_use]
    pub fn new(ceiling: i64) -> Self {
        Self { ceiling }
    }

    /// The configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> i64 {
        self.ceiling
    }

    /// Check whether one more issuance is allowed given the historical count.
    pub fn check(&self, issued_so_far: i64) -> Result<(), AttemptsExceeded> {
        if issued_so_far >= self.ceiling {
            return Err(AttemptsExceeded);
        }
        Ok(())
    }
}
