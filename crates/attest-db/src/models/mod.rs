//! Database entity models.

pub mod invite;
pub mod subject;
pub mod verification_token;

pub use invite::{Invite, InviteStatus};
pub use subject::SubjectState;
pub use verification_token::{CreateVerificationToken, VerificationToken};
