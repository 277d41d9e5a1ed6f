//! Single-use verification token lifecycle engine.
//!
//! This crate owns the trust-critical core of account verification flows:
//! signed single-use tokens for email verification, password reset,
//! subscriber double opt-in, and organization invitations, plus scoped
//! anonymous sessions for public surfaces.
//!
//! The moving parts:
//!
//! - [`TokenCodec`] signs and verifies tokens (pure, no I/O)
//! - [`TokenStore`] / [`InviteStore`] abstract persistence; Postgres
//!   adapters live in [`pg`], in-memory implementations back the tests
//! - [`VerificationService`] runs the issue/verify lifecycle with
//!   supersession, silent rotation, and the attempt ceiling
//! - [`InviteAcceptance`] consumes invitations race-safely
//! - [`AnonymousSessionBootstrap`] issues scoped sessions for visitors
//!
//! Guarantees the engine upholds:
//!
//! - at most one live token per subject+purpose at any instant
//! - expired recoverable tokens rotate silently; the old link keeps working
//!   as a trigger for a fresh email
//! - issuance is capped per subject+purpose; expiry never refunds budget
//! - an invitation is consumed exactly once, only by its bound recipient

pub mod codec;
pub mod error;
pub mod invite;
pub mod limiter;
pub mod mailer;
pub mod pg;
pub mod policy;
pub mod service;
pub mod session;
pub mod store;

pub use codec::{SignedToken, TokenBinding, TokenCodec};
pub use error::{Result, VerifyError};
pub use invite::{AcceptedInvite, InviteAcceptance, MembershipProvisioner};
pub use limiter::AttemptLimiter;
pub use mailer::{Mailer, MockMailer, VerificationEmail};
pub use pg::{PgInviteStore, PgTokenStore};
pub use policy::PurposePolicy;
pub use service::{Verification, VerificationService};
pub use session::{
    AnonymousDirectory, AnonymousSessionBootstrap, AnonymousSubject, ScopeClaims, SessionIssuer,
    SessionTokens,
};
pub use store::{
    InMemoryInviteStore, InMemoryTokenStore, InviteRecord, InviteStore, NewToken, TokenRecord,
    TokenStore,
};
