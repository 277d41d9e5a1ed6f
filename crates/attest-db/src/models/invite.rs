//! Organization invitation model.
//!
//! An invite binds a recipient email and a role to a destination
//! organization. It is created `Pending` and moves exactly once to a terminal
//! state: `Accepted` by the matching recipient, or `Expired` when its token's
//! signature check reports expiry. Both transitions are conditional updates
//! so that two concurrent requests cannot both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DbError;

/// Invitation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    /// Created, waiting for the recipient.
    Pending,
    /// Accepted by the recipient. Terminal.
    Accepted,
    /// Token expired before acceptance. Terminal; a human must re-invite.
    Expired,
}

impl InviteStatus {
    /// String form used for the status column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Expired => "expired",
        }
    }

    /// Whether no further transitions are permitted out of this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, InviteStatus::Accepted | InviteStatus::Expired)
    }
}

impl Display for InviteStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InviteStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "expired" => Ok(InviteStatus::Expired),
            other => Err(DbError::CorruptRow(format!("unknown invite status: {other}"))),
        }
    }
}

/// An organization invitation record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invite {
    /// Unique invitation identifier.
    pub id: Uuid,

    /// Destination organization.
    pub org_id: Uuid,

    /// Email address the invitation was sent to.
    pub recipient_email: String,

    /// Role granted on acceptance.
    pub role: String,

    /// Lifecycle state: pending, accepted, expired.
    pub status: String,

    /// Opaque public token string from the invitation email.
    pub token: String,

    /// Private bytes used to validate the token signature.
    pub secret: Vec<u8>,

    /// Token expiry timestamp.
    pub expires_at: DateTime<Utc>,

    /// When the recipient accepted (None while pending).
    pub accepted_at: Option<DateTime<Utc>>,

    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Invite {
    /// Parse the stored status column into the typed enum.
    pub fn status(&self) -> Result<InviteStatus, DbError> {
        self.status.parse()
    }

    /// Find an invitation by its public token string.
    pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, DbError> {
        let record = sqlx::query_as(
            r"
            SELECT * FROM invites
            WHERE token = $1
            ",
        )
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Transition a pending invitation to accepted.
    ///
    /// The `WHERE status = 'pending'` guard makes this a compare-and-swap:
    /// of two concurrent acceptance requests only one can observe a row, the
    /// other sees zero rows affected. Returns `true` if this call won.
    pub async fn mark_accepted(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"
            UPDATE invites
            SET status = 'accepted', accepted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a pending invitation to expired.
    ///
    /// Same conditional-update discipline as [`Invite::mark_accepted`];
    /// a no-op when the invite already reached a terminal state.
    pub async fn mark_expired(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"
            UPDATE invites
            SET status = 'expired', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
