//! Postgres-backed store adapters.
//!
//! Thin translations from the engine's store traits onto the `attest-db`
//! models. All lifecycle decisions stay in the engine; these adapters only
//! move rows.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use attest_core::{InviteId, OrgId, Purpose};
use attest_db::{CreateVerificationToken, Invite, SubjectState, VerificationToken};

use crate::error::VerifyError;
use crate::store::{InviteRecord, InviteStore, NewToken, TokenRecord, TokenStore};

/// [`TokenStore`] backed by the `verification_tokens` table.
#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_record(row: VerificationToken) -> Result<TokenRecord, VerifyError> {
    let purpose = row.purpose()?;
    Ok(TokenRecord {
        id: row.id,
        subject_id: row.subject_id,
        purpose,
        email: row.email,
        token: row.token,
        secret: row.secret,
        expires_at: row.expires_at,
        created_at: row.created_at,
    })
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn supersede_and_create(&self, token: NewToken) -> Result<TokenRecord, VerifyError> {
        let row = VerificationToken::supersede_and_create(
            &self.pool,
            &CreateVerificationToken {
                subject_id: token.subject_id,
                purpose: token.purpose,
                email: token.email,
                token: token.token,
                secret: token.secret,
                expires_at: token.expires_at,
            },
        )
        .await?;
        into_record(row)
    }

    async fn find_by_token(
        &self,
        purpose: Purpose,
        token: &str,
    ) -> Result<Option<TokenRecord>, VerifyError> {
        match VerificationToken::find_by_token(&self.pool, purpose, token).await? {
            Some(row) => Ok(Some(into_record(row)?)),
            None => Ok(None),
        }
    }

    async fn expire_all_live(
        &self,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<u64, VerifyError> {
        Ok(VerificationToken::expire_all_live(&self.pool, subject_id, purpose).await?)
    }

    async fn count_issued(&self, subject_id: Uuid, purpose: Purpose) -> Result<i64, VerifyError> {
        Ok(VerificationToken::count_issued(&self.pool, subject_id, purpose).await?)
    }

    async fn load_subject(
        &self,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<SubjectState>, VerifyError> {
        Ok(SubjectState::load(&self.pool, subject_id, purpose).await?)
    }
}

/// [`InviteStore`] backed by the `invites` table.
#[derive(Debug, Clone)]
pub struct PgInviteStore {
    pool: PgPool,
}

impl PgInviteStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InviteStore for PgInviteStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<InviteRecord>, VerifyError> {
        let Some(row) = Invite::find_by_token(&self.pool, token).await? else {
            return Ok(None);
        };
        let status = row.status()?;
        Ok(Some(InviteRecord {
            id: InviteId::from_uuid(row.id),
            org_id: OrgId::from_uuid(row.org_id),
            recipient_email: row.recipient_email,
            role: row.role,
            status,
            token: row.token,
            secret: row.secret,
            expires_at: row.expires_at,
        }))
    }

    async fn mark_accepted(&self, id: InviteId) -> Result<bool, VerifyError> {
        Ok(Invite::mark_accepted(&self.pool, *id.as_uuid()).await?)
    }

    async fn mark_expired(&self, id: InviteId) -> Result<bool, VerifyError> {
        Ok(Invite::mark_expired(&self.pool, *id.as_uuid()).await?)
    }
}
