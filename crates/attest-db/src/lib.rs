//! Postgres persistence for the attest verification core.
//!
//! Each model is a `FromRow` struct with inherent async query methods taking
//! a `&PgPool`. Queries are runtime-checked so the crate compiles without a
//! live database; the schema lives with the deployment, not here.
//!
//! Expired verification tokens are retained (marked, never deleted) to keep
//! an audit trail of verification attempts.

pub mod error;
pub mod models;

pub use error::DbError;
pub use models::{
    CreateVerificationToken, Invite, InviteStatus, SubjectState, VerificationToken,
};
