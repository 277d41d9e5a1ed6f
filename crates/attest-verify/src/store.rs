//! Storage traits for tokens and invitations, with in-memory implementations.
//!
//! The engine talks to persistence through these traits so the lifecycle
//! logic can be exercised without a database. Production wires in the
//! Postgres adapters from [`crate::pg`]; tests use the in-memory stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use attest_core::{InviteId, OrgId, Purpose};
use attest_db::{InviteStatus, SubjectState};

use crate::error::VerifyError;

/// A persisted verification token as the engine sees it.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    /// Unique identifier for this issuance.
    pub id: Uuid,
    /// The identity this token verifies.
    pub subject_id: Uuid,
    /// The verification flow this token belongs to.
    pub purpose: Purpose,
    /// Email address the token was bound to at issuance.
    pub email: String,
    /// Opaque public token string.
    pub token: String,
    /// Private bytes used to validate the token signature.
    pub secret: Vec<u8>,
    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,
    /// When the token was created.
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the token is still live (not yet expired).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Data required to persist a freshly signed token.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub subject_id: Uuid,
    pub purpose: Purpose,
    pub email: String,
    pub token: String,
    pub secret: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// Storage of verification tokens and the subjects they verify.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Atomically expire every live token for the new token's
    /// subject+purpose and persist the new one.
    ///
    /// The two steps must be indivisible: of two concurrent issuances for
    /// the same subject+purpose, exactly one token may be left live.
    async fn supersede_and_create(&self, token: NewToken) -> Result<TokenRecord, VerifyError>;

    /// Look up a token by its public string within a purpose.
    async fn find_by_token(
        &self,
        purpose: Purpose,
        token: &str,
    ) -> Result<Option<TokenRecord>, VerifyError>;

    /// Expire every live token for a subject+purpose.
    ///
    /// Returns the number of tokens expired; zero is a no-op, not an error.
    async fn expire_all_live(
        &self,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<u64, VerifyError>;

    /// Count every issuance ever made for a subject+purpose, live or not.
    async fn count_issued(&self, subject_id: Uuid, purpose: Purpose) -> Result<i64, VerifyError>;

    /// Load the subject a token points at, with its current email and
    /// confirmation status. `None` when the subject no longer exists.
    async fn load_subject(
        &self,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<SubjectState>, VerifyError>;
}

/// A persisted organization invitation as the engine sees it.
#[derive(Debug, Clone)]
pub struct InviteRecord {
    /// Unique invitation identifier.
    pub id: InviteId,
    /// Destination organization.
    pub org_id: OrgId,
    /// Email address the invitation was sent to.
    pub recipient_email: String,
    /// Role granted on acceptance.
    pub role: String,
    /// Lifecycle state.
    pub status: InviteStatus,
    /// Opaque public token string from the invitation email.
    pub token: String,
    /// Private bytes used to validate the token signature.
    pub secret: Vec<u8>,
    /// Token expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Storage of organization invitations.
#[async_trait]
pub trait InviteStore: Send + Sync {
    /// Look up an invitation by its public token string.
    async fn find_by_token(&self, token: &str) -> Result<Option<InviteRecord>, VerifyError>;

    /// Transition a pending invitation to accepted.
    ///
    /// Implementations must guard on the pending state so that of two
    /// concurrent acceptance calls exactly one returns `true`.
    async fn mark_accepted(&self, id: InviteId) -> Result<bool, VerifyError>;

    /// Transition a pending invitation to expired. Returns `false` when the
    /// invite already reached a terminal state.
    async fn mark_expired(&self, id: InviteId) -> Result<bool, VerifyError>;
}

/// In-memory implementation of [`TokenStore`] for testing.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Vec<TokenRecord>>,
    subjects: RwLock<HashMap<Uuid, SubjectState>>,
}

impl InMemoryTokenStore {
    /// Create a new in-memory token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subject so `load_subject` can resolve it (for testing).
    pub fn put_subject(&self, subject_id: Uuid, email: &str, confirmed: bool) {
        self.subjects.write().expect("lock poisoned").insert(
            subject_id,
            SubjectState {
                email: email.to_string(),
                confirmed,
            },
        );
    }

    /// Flip a subject's confirmation flag (for testing).
    pub fn set_confirmed(&self, subject_id: Uuid, confirmed: bool) {
        if let Some(state) = self
            .subjects
            .write()
            .expect("lock poisoned")
            .get_mut(&subject_id)
        {
            state.confirmed = confirmed;
        }
    }

    /// Remove a subject entirely (for testing deleted-entity paths).
    pub fn remove_subject(&self, subject_id: Uuid) {
        self.subjects
            .write()
            .expect("lock poisoned")
            .remove(&subject_id);
    }

    /// Count live tokens for a subject+purpose (for testing).
    pub fn live_count(&self, subject_id: Uuid, purpose: Purpose) -> usize {
        self.tokens
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|t| t.subject_id == subject_id && t.purpose == purpose && t.is_live())
            .count()
    }

    /// Total number of stored issuances (for testing).
    pub fn total_count(&self) -> usize {
        self.tokens.read().expect("lock poisoned").len()
    }

    /// Force a stored token past its expiry (for testing expired paths).
    pub fn force_expire(&self, token: &str) {
        let mut tokens = self.tokens.write().expect("lock poisoned");
        for record in tokens.iter_mut() {
            if record.token == token {
                record.expires_at = Utc::now() - chrono::Duration::seconds(1);
            }
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn supersede_and_create(&self, token: NewToken) -> Result<TokenRecord, VerifyError> {
        let record = TokenRecord {
            id: Uuid::new_v4(),
            subject_id: token.subject_id,
            purpose: token.purpose,
            email: token.email,
            token: token.token,
            secret: token.secret,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        // Expiry and insert happen under one write-lock hold, so a
        // concurrent issuance cannot interleave between them.
        let mut tokens = self.tokens.write().expect("lock poisoned");
        let now = Utc::now();
        for existing in tokens.iter_mut() {
            if existing.subject_id == record.subject_id
                && existing.purpose == record.purpose
                && existing.expires_at > now
            {
                existing.expires_at = now;
            }
        }
        tokens.push(record.clone());
        Ok(record)
    }

    async fn find_by_token(
        &self,
        purpose: Purpose,
        token: &str,
    ) -> Result<Option<TokenRecord>, VerifyError> {
        Ok(self
            .tokens
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|t| t.purpose == purpose && t.token == token)
            .cloned())
    }

    async fn expire_all_live(
        &self,
        subject_id: Uuid,
        purpose: Purpose,
    ) -> Result<u64, VerifyError> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().expect("lock poisoned");
        let mut touched = 0;
        for record in tokens.iter_mut() {
            if record.subject_id == subject_id && record.purpose == purpose && record.expires_at > now
            {
                record.expires_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn count_issued(&self, subject_id: Uuid, purpose: Purpose) -> Result<i64, VerifyError> {
        let count = self
            .tokens
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|t| t.subject_id == subject_id && t.purpose == purpose)
            .count();
        Ok(count as i64)
    }

    async fn load_subject(
        &self,
        subject_id: Uuid,
        _purpose: Purpose,
    ) -> Result<Option<SubjectState>, VerifyError> {
        Ok(self
            .subjects
            .read()
            .expect("lock poisoned")
            .get(&subject_id)
            .cloned())
    }
}

/// In-memory implementation of [`InviteStore`] for testing.
#[derive(Debug, Default)]
pub struct InMemoryInviteStore {
    invites: RwLock<HashMap<InviteId, InviteRecord>>,
}

impl InMemoryInviteStore {
    /// Create a new in-memory invite store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an invitation (for testing).
    pub fn put(&self, invite: InviteRecord) {
        self.invites
            .write()
            .expect("lock poisoned")
            .insert(invite.id, invite);
    }

    /// Read back an invitation's current state (for testing).
    pub fn get(&self, id: InviteId) -> Option<InviteRecord> {
        self.invites
            .read()
            .expect("lock poisoned")
            .get(&id)
            .cloned()
    }
}

#[async_trait]
impl InviteStore for InMemoryInviteStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<InviteRecord>, VerifyError> {
        Ok(self
            .invites
            .read()
            .expect("lock poisoned")
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn mark_accepted(&self, id: InviteId) -> Result<bool, VerifyError> {
        // Check-and-set under one write lock; mirrors the conditional
        // UPDATE the Postgres adapter issues.
        let mut invites = self.invites.write().expect("lock poisoned");
        match invites.get_mut(&id) {
            Some(invite) if invite.status == InviteStatus::Pending => {
                invite.status = InviteStatus::Accepted;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_expired(&self, id: InviteId) -> Result<bool, VerifyError> {
        let mut invites = self.invites.write().expect("lock poisoned");
        match invites.get_mut(&id) {
            Some(invite) if invite.status == InviteStatus::Pending => {
                invite.status = InviteStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
