//! Core types shared across the attest workspace.
//!
//! This crate provides the strongly typed identifiers used by the
//! persistence layer and the verification engine, plus the [`Purpose`]
//! vocabulary that names the verification flows a token can belong to.
//!
//! It deliberately has no I/O and no heavyweight dependencies so that every
//! other crate in the workspace can depend on it.

pub mod ids;
pub mod purpose;

pub use ids::{AssessmentId, InviteId, OrgId, ParseIdError, TrustCenterId, UserId};
pub use purpose::{ParsePurposeError, Purpose};
