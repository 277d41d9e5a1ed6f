//! Verification token entity model.
//!
//! One row per issuance. A token is "live" while its `expires_at` lies in the
//! future; superseded tokens are expired in place by setting `expires_at` to
//! the current time rather than deleting the row, so the full issuance
//! history stays queryable for auditing and for the attempt ceiling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;
use attest_core::Purpose;

/// A verification token record in the database.
///
/// The `token` column holds the opaque public string mailed to the user; the
/// `secret` column holds the private bytes needed to validate its signature
/// and is never sent to the client.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VerificationToken {
    /// Unique identifier for this token record.
    pub id: Uuid,

    /// The identity this token verifies (user or subscriber).
    pub subject_id: Uuid,

    /// The verification flow this token belongs to.
    pub purpose: String,

    /// Email address the token was bound to at issuance.
    pub email: String,

    /// Opaque public token string, unique per purpose+subject at any instant.
    pub token: String,

    /// Private bytes used to validate the token signature.
    pub secret: Vec<u8>,

    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,

    /// When the token was created.
    pub created_at: DateTime<Utc>,
}

/// Data required to create a new verification token record.
#[derive(Debug, Clone)]
pub struct CreateVerificationToken {
    pub subject_id: Uuid,
    pub purpose: Purpose,
    pub email: String,
    pub token: String,
    pub secret: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Check if the token is still live (not yet expired).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }

    /// Check if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_live()
    }

    /// Parse the stored purpose column into the typed enum.
    pub fn purpose(&self) -> Result<Purpose, DbError> {
        self.purpose
            .parse()
            .map_err(|_| DbError::CorruptRow(format!("unknown purpose: {}", self.purpose)))
    }

    /// Expire every live token for the subject+purpose and insert the new
    /// one, as a single transaction.
    ///
    /// An advisory transaction lock keyed on (subject, purpose) serializes
    /// concurrent issuances: two simultaneous resends cannot both leave a
    /// live row, the second waits and expires the first's token.
    pub async fn supersede_and_create(
        pool: &PgPool,
        data: &CreateVerificationToken,
    ) -> Result<Self, DbError> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
            .bind(data.subject_id.to_string())
            .bind(data.purpose.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            UPDATE verification_tokens
            SET expires_at = NOW()
            WHERE subject_id = $1 AND purpose = $2 AND expires_at > NOW()
            ",
        )
        .bind(data.subject_id)
        .bind(data.purpose.as_str())
        .execute(&mut *tx)
        .await?;

        let record = sqlx::query_as(
            r"
            INSERT INTO verification_tokens
                (subject_id, purpose, email, token, secret, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(data.subject_id)
        .bind(data.purpose.as_str())
        .bind(&data.email)
        .bind(&data.token)
        .bind(&data.secret)
        .bind(data.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record)
    }

    /// Find a token by its public string within a purpose.
    pub async fn find_by_token(
        pool: &PgPool,
        purpose: Purpose,
        token: &str,
    ) -> Result<Option<Self>, DbError> {
        let record = sqlx::query_as(
            r"
            SELECT * FROM verification_tokens
            WHERE purpose = $1 AND token = $2
            ",
        )
        .bind(purpose.as_str())
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Expire every live token for a subject+purpose by setting `expires_at`
    /// to now. Returns the number of rows touched; zero live rows is a no-op,
    /// not an error.
    pub async fn expire_all_live(
        pool: &PgPool,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"
            UPDATE verification_tokens
            SET expires_at = NOW()
            WHERE subject_id = $1 AND purpose = $2 AND expires_at > NOW()
            ",
        )
        .bind(subject_id)
        .bind(purpose.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Count every issuance ever made for a subject+purpose, live or not.
    ///
    /// Feeds the attempt ceiling; expiry does not reset it.
    pub async fn count_issued(
        pool: &PgPool,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<i64, DbError> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM verification_tokens
            WHERE subject_id = $1 AND purpose = $2
            ",
        )
        .bind(subject_id)
        .bind(purpose.as_str())
        .fetch_one(pool)
        .await?;

        Ok(row.0)
    }
}
