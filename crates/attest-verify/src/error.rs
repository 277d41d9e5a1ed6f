//! Error taxonomy for the verification engine.
//!
//! Every failure is returned as a typed error to the calling handler, which
//! owns the mapping to transport status codes. Persistence failures are
//! surfaced as [`VerifyError::Database`] and never masked as verification
//! failures.

use thiserror::Error;

use attest_core::Purpose;

/// Errors surfaced by the verification engine.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A required field was missing or empty; rejected before any store access.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The purpose is served by a dedicated flow, not this service.
    #[error("unsupported purpose: {0}")]
    UnsupportedPurpose(Purpose),

    /// The token string matched nothing in the store.
    ///
    /// Reported generically so a caller cannot probe which tokens ever
    /// existed.
    #[error("object not found")]
    NotFound,

    /// The token had expired, and a fresh one has been issued and dispatched
    /// for the same subject and purpose.
    #[error("token expired, a new token has been issued")]
    TokenExpiredRotated,

    /// The token had expired and its purpose forbids rotation.
    #[error("token has expired")]
    TokenExpired,

    /// Signature mismatch or secret not belonging to this issuance. Terminal;
    /// never triggers rotation.
    #[error("token is invalid")]
    TokenInvalid,

    /// The issuance ceiling for this subject+purpose has been reached.
    /// Permanent until reset out of band.
    #[error("max attempts reached for this verification")]
    MaxAttemptsExceeded,

    /// The authenticated caller's email does not match the invitation's
    /// bound recipient.
    #[error("could not verify email")]
    EmailMismatch,

    /// The operation was re-run against an entity already in its terminal
    /// state (e.g. an invite that was already accepted).
    #[error("already completed")]
    AlreadyCompleted,

    /// The persistence layer failed; fatal for the request.
    #[error("database error: {0}")]
    Database(#[from] attest_db::DbError),

    /// A non-database store implementation failed; fatal for the request.
    #[error("store error: {0}")]
    Store(String),

    /// The email queue rejected the dispatch after the token was persisted.
    #[error("email dispatch failed: {0}")]
    Dispatch(String),

    /// The session subsystem failed to issue tokens.
    #[error("session issuance failed: {0}")]
    Session(String),
}

impl VerifyError {
    /// Whether this error is terminal for the token (no rotation, no retry
    /// with the same token will ever succeed).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerifyError::TokenInvalid
                | VerifyError::TokenExpired
                | VerifyError::EmailMismatch
                | VerifyError::AlreadyCompleted
                | VerifyError::MaxAttemptsExceeded
        )
    }
}

/// Type alias for Results using [`VerifyError`].
pub type Result<T> = std::result::Result<T, VerifyError>;
