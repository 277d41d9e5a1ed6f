//! Subject state lookups.
//!
//! Verification outcomes depend on the current state of the entity a token
//! verifies: the email on the entity must still match the one the token was
//! bound to, and a purpose that has already been satisfied (email confirmed,
//! subscriber verified) suppresses rotation of expired links.
//!
//! Users back email verification and password reset; subscribers back double
//! opt-in confirmation. Invites carry their own state on the invite row.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use attest_core::Purpose;

/// Current state of the entity a verification token points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectState {
    /// The entity's current email address.
    pub email: String,
    /// Whether the purpose has already been satisfied for this entity.
    pub confirmed: bool,
}

impl SubjectState {
    /// Load the state backing a subject for the given purpose, or `None`
    /// when the owning entity no longer exists.
    pub async fn load(
        pool: &PgPool,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<Self>, DbError> {
        let row: Option<(String, bool)> = match purpose {
            Purpose::EmailVerification => {
                sqlx::query_as("SELECT email, email_confirmed FROM users WHERE id = $1")
                    .bind(subject_id)
                    .fetch_optional(pool)
                    .await?
            }
            // A reset is never "already satisfied"; expired links always rotate.
            Purpose::PasswordReset => {
                sqlx::query_as("SELECT email, false FROM users WHERE id = $1")
                    .bind(subject_id)
                    .fetch_optional(pool)
                    .await?
            }
            Purpose::SubscriberConfirm => {
                sqlx::query_as("SELECT email, verified_email FROM subscribers WHERE id = $1")
                    .bind(subject_id)
                    .fetch_optional(pool)
                    .await?
            }
            Purpose::OrgInvite => {
                return Err(DbError::CorruptRow(
                    "org_invite subjects live on the invites table".to_string(),
                ))
            }
        };

        Ok(row.map(|(email, confirmed)| SubjectState { email, confirmed }))
    }
}
