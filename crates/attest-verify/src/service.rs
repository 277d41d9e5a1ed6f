//! Verification token lifecycle engine.
//!
//! [`VerificationService`] owns the full lifecycle of single-use tokens:
//! issuance (with supersession and the attempt ceiling), dispatch, and
//! verification (with silent rotation of recoverable expiries). One instance
//! serves all purposes; per-purpose behavior comes from [`PurposePolicy`].

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use attest_core::Purpose;

use crate::codec::{CodecError, SignedToken, TokenBinding, TokenCodec};
use crate::error::{Result, VerifyError};
use crate::limiter::AttemptLimiter;
use crate::mailer::{Mailer, VerificationEmail};
use crate::policy::PurposePolicy;
use crate::store::{NewToken, TokenRecord, TokenStore};

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// The subject the token verified.
    pub subject_id: Uuid,
    /// The email address the token was bound to.
    pub email: String,
    /// True when the presented token had expired but the subject was already
    /// confirmed, so the stale link was honored instead of rotated.
    pub already_confirmed: bool,
}

/// Issues, dispatches, and verifies single-use tokens.
pub struct VerificationService {
    codec: TokenCodec,
    store: Arc<dyn TokenStore>,
    mailer: Arc<dyn Mailer>,
    limiter: AttemptLimiter,
    policies: HashMap<Purpose, PurposePolicy>,
}

impl VerificationService {
    /// Create a service with default per-purpose policies and the default
    /// attempt ceiling.
    #[must_use]
    pub fn new(codec: TokenCodec, store: Arc<dyn TokenStore>, mailer: Arc<dyn Mailer>) -> Self {
        let policies = Purpose::all()
            .iter()
            .map(|&p| (p, PurposePolicy::for_purpose(p)))
            .collect();
        Self {
            codec,
            store,
            mailer,
            limiter: AttemptLimiter::default(),
            policies,
        }
    }

    /// Override the attempt ceiling.
    #[must_use]
    pub fn with_limiter(mut self, limiter: AttemptLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Override the policy for one purpose.
    #[must_use]
    pub fn with_policy(mut self, purpose: Purpose, policy: PurposePolicy) -> Self {
        self.policies.insert(purpose, policy);
        self
    }

    fn policy(&self, purpose: Purpose) -> PurposePolicy {
        self.policies
            .get(&purpose)
            .copied()
            .unwrap_or_else(|| PurposePolicy::for_purpose(purpose))
    }

    /// Issue a fresh token for a subject and hand it to the mailer.
    ///
    /// Any live token for the same subject+purpose is expired in the same
    /// store operation that persists the new one, so at most one token is
    /// live at any instant even under concurrent resends. The attempt
    /// ceiling counts every issuance ever made; superseded tokens still
    /// count against it. A dispatch failure after the token is persisted is
    /// surfaced to the caller; the persisted token stays valid for a later
    /// resend.
    pub async fn issue_and_dispatch(
        &self,
        purpose: Purpose,
        subject_id: Uuid,
        email: &str,
    ) -> Result<TokenRecord> {
        check_purpose(purpose)?;
        if email.is_empty() {
            return Err(VerifyError::MissingField("email"));
        }

        let record = self.issue(purpose, subject_id, email).await?;
        self.dispatch(&record).await?;

        tracing::info!(
            subject_id = %subject_id,
            purpose = %purpose,
            expires_at = %record.expires_at,
            "issued verification token"
        );

        Ok(record)
    }

    /// Verify a presented token string.
    ///
    /// Expired tokens for rotating purposes are silently replaced: a fresh
    /// token is issued and dispatched, and the caller receives
    /// [`VerifyError::TokenExpiredRotated`] to relay. An expired token for an
    /// already-confirmed subject succeeds instead when the purpose's policy
    /// allows it, so stale links in old emails stay harmless.
    pub async fn verify(&self, purpose: Purpose, token: &str) -> Result<Verification> {
        check_purpose(purpose)?;
        if token.is_empty() {
            return Err(VerifyError::MissingField("token"));
        }

        let record = self
            .store
            .find_by_token(purpose, token)
            .await?
            .ok_or(VerifyError::NotFound)?;

        let subject = self
            .store
            .load_subject(record.subject_id, purpose)
            .await?
            .ok_or(VerifyError::NotFound)?;

        // The token is bound to the email it was issued against. If the
        // subject's address has changed since, the token no longer proves
        // control of the current address.
        if subject.email != record.email {
            return Err(VerifyError::TokenInvalid);
        }

        let binding = TokenBinding::new(record.subject_id.to_string(), record.email.clone());
        match self
            .codec
            .verify(purpose, &binding, token, &record.secret, record.expires_at)
        {
            Ok(()) => Ok(Verification {
                subject_id: record.subject_id,
                email: record.email,
                already_confirmed: false,
            }),
            Err(CodecError::Expired) => {
                let policy = self.policy(purpose);

                if policy.expired_after_completion_is_success && subject.confirmed {
                    return Ok(Verification {
                        subject_id: record.subject_id,
                        email: record.email,
                        already_confirmed: true,
                    });
                }

                if !policy.allows_rotation {
                    return Err(VerifyError::TokenExpired);
                }

                let fresh = self.issue(purpose, record.subject_id, &record.email).await?;
                self.dispatch(&fresh).await?;

                tracing::info!(
                    subject_id = %record.subject_id,
                    purpose = %purpose,
                    "rotated expired verification token"
                );

                Err(VerifyError::TokenExpiredRotated)
            }
            Err(CodecError::MissingEmail) => Err(VerifyError::MissingField("email")),
            Err(CodecError::MissingSubject) => Err(VerifyError::MissingField("subject")),
            Err(CodecError::InvalidSecret | CodecError::Invalid) => Err(VerifyError::TokenInvalid),
        }
    }

    /// Expire every live token for a subject+purpose after the flow is done.
    ///
    /// Returns the number of tokens expired.
    pub async fn complete(&self, purpose: Purpose, subject_id: Uuid) -> Result<u64> {
        let expired = self.store.expire_all_live(subject_id, purpose).await?;
        if expired > 0 {
            tracing::info!(
                subject_id = %subject_id,
                purpose = %purpose,
                expired,
                "completed verification, expired live tokens"
            );
        }
        Ok(expired)
    }

    /// Check the ceiling, sign, then supersede-and-persist in one store op.
    async fn issue(
        &self,
        purpose: Purpose,
        subject_id: Uuid,
        email: &str,
    ) -> Result<TokenRecord> {
        let issued = self.store.count_issued(subject_id, purpose).await?;
        if self.limiter.check(issued).is_err() {
            tracing::warn!(
                subject_id = %subject_id,
                purpose = %purpose,
                issued,
                "attempt ceiling reached"
            );
            return Err(VerifyError::MaxAttemptsExceeded);
        }

        let policy = self.policy(purpose);
        let expires_at = Utc::now() + policy.ttl;
        let binding = TokenBinding::new(subject_id.to_string(), email.to_string());
        let SignedToken {
            token,
            secret,
            expires_at,
        } = self
            .codec
            .sign(purpose, &binding, expires_at)
            .map_err(map_sign_error)?;

        let record = self
            .store
            .supersede_and_create(NewToken {
                subject_id,
                purpose,
                email: email.to_string(),
                token,
                secret,
                expires_at,
            })
            .await?;

        Ok(record)
    }

    async fn dispatch(&self, record: &TokenRecord) -> Result<()> {
        let job_id = self
            .mailer
            .enqueue(VerificationEmail {
                purpose: record.purpose,
                recipient: record.email.clone(),
                token: record.token.clone(),
                expires_at: record.expires_at,
            })
            .await?;

        tracing::debug!(
            job_id = %job_id,
            purpose = %record.purpose,
            "enqueued verification email"
        );

        Ok(())
    }
}

// Invitations carry their state on the invite row and go through
// InviteAcceptance; this service only runs the subject-bound purposes.
fn check_purpose(purpose: Purpose) -> Result<()> {
    if purpose == Purpose::OrgInvite {
        return Err(VerifyError::UnsupportedPurpose(purpose));
    }
    Ok(())
}

fn map_sign_error(err: CodecError) -> VerifyError {
    match err {
        CodecError::MissingEmail => VerifyError::MissingField("email"),
        CodecError::MissingSubject => VerifyError::MissingField("subject"),
        // sign never reports these
        CodecError::Expired | CodecError::InvalidSecret | CodecError::Invalid => {
            VerifyError::TokenInvalid
        }
    }
}
