//! Organization invitation acceptance.
//!
//! Acceptance is a fail-fast chain: every check runs before any state
//! changes, and the single state change is a conditional update, so a lost
//! race or a replayed link can never grant membership twice.

use async_trait::async_trait;
use std::sync::Arc;

use attest_core::{InviteId, OrgId, Purpose, UserId};
use attest_db::InviteStatus;

use crate::codec::{CodecError, TokenBinding, TokenCodec};
use crate::error::{Result, VerifyError};
use crate::session::{SessionIssuer, SessionTokens};
use crate::store::{InviteRecord, InviteStore};

/// Outcome of a successful acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedInvite {
    /// The invitation that was consumed.
    pub invite_id: InviteId,
    /// The organization joined.
    pub org_id: OrgId,
    /// The role granted.
    pub role: String,
    /// The email the invitation was bound to.
    pub recipient_email: String,
}

/// Grants organization membership after an invitation is consumed.
#[async_trait]
pub trait MembershipProvisioner: Send + Sync {
    /// Add a user to an organization with the given role.
    async fn provision(&self, user_id: UserId, org_id: OrgId, role: &str) -> Result<()>;
}

/// Consumes organization invitations.
pub struct InviteAcceptance {
    codec: TokenCodec,
    store: Arc<dyn InviteStore>,
    provisioner: Arc<dyn MembershipProvisioner>,
    sessions: Arc<dyn SessionIssuer>,
}

impl InviteAcceptance {
    /// Create an acceptance service.
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn InviteStore>,
        provisioner: Arc<dyn MembershipProvisioner>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self {
            codec,
            store,
            provisioner,
            sessions,
        }
    }

    /// Accept an invitation by its token, on behalf of an authenticated
    /// caller.
    ///
    /// The caller's verified email must match the invitation's recipient;
    /// holding the link is not enough. An expired token moves the invite to
    /// its terminal expired state (never rotated; a human re-invites). Of
    /// two concurrent acceptances exactly one wins, the other sees
    /// [`VerifyError::AlreadyCompleted`].
    pub async fn accept(&self, token: &str, caller_email: &str) -> Result<AcceptedInvite> {
        if token.is_empty() {
            return Err(VerifyError::MissingField("token"));
        }
        if caller_email.is_empty() {
            return Err(VerifyError::MissingField("email"));
        }

        let invite = self
            .store
            .find_by_token(token)
            .await?
            .ok_or(VerifyError::NotFound)?;

        match invite.status {
            InviteStatus::Accepted => return Err(VerifyError::AlreadyCompleted),
            InviteStatus::Expired => return Err(VerifyError::TokenExpired),
            InviteStatus::Pending => {}
        }

        if !invite
            .recipient_email
            .eq_ignore_ascii_case(caller_email)
        {
            tracing::warn!(
                invite_id = %invite.id,
                org_id = %invite.org_id,
                "invitation presented by non-recipient"
            );
            return Err(VerifyError::EmailMismatch);
        }

        self.check_signature(&invite, token).await?;

        // Conditional transition; the loser of a race lands here with a
        // terminal row and gets AlreadyCompleted.
        if !self.store.mark_accepted(invite.id).await? {
            return Err(VerifyError::AlreadyCompleted);
        }

        tracing::info!(
            invite_id = %invite.id,
            org_id = %invite.org_id,
            role = %invite.role,
            "invitation accepted"
        );

        Ok(AcceptedInvite {
            invite_id: invite.id,
            org_id: invite.org_id,
            role: invite.role,
            recipient_email: invite.recipient_email,
        })
    }

    /// Accept an invitation, provision membership, and open a session.
    ///
    /// The combined flow for a signup-via-invite: once the invitation is
    /// consumed the user is added to the organization and logged straight
    /// in.
    pub async fn accept_and_join(
        &self,
        token: &str,
        caller_email: &str,
        user_id: UserId,
    ) -> Result<(AcceptedInvite, SessionTokens)> {
        let accepted = self.accept(token, caller_email).await?;

        self.provisioner
            .provision(user_id, accepted.org_id, &accepted.role)
            .await?;

        let tokens = self.sessions.issue_member(user_id, accepted.org_id).await?;

        tracing::info!(
            user_id = %user_id,
            org_id = %accepted.org_id,
            role = %accepted.role,
            "member joined via invitation"
        );

        Ok((accepted, tokens))
    }

    /// Validate the token signature; an expired signature retires the
    /// invite.
    async fn check_signature(&self, invite: &InviteRecord, token: &str) -> Result<()> {
        let binding =
            TokenBinding::new(invite.org_id.to_string(), invite.recipient_email.clone());
        match self.codec.verify(
            Purpose::OrgInvite,
            &binding,
            token,
            &invite.secret,
            invite.expires_at,
        ) {
            Ok(()) => Ok(()),
            Err(CodecError::Expired) => {
                self.store.mark_expired(invite.id).await?;
                tracing::info!(invite_id = %invite.id, "invitation expired on presentation");
                Err(VerifyError::TokenExpired)
            }
            Err(_) => Err(VerifyError::TokenInvalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInviteStore;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    #[derive(Default)]
    struct RecordingProvisioner {
        grants: RwLock<Vec<(UserId, OrgId, String)>>,
    }

    #[async_trait]
    impl MembershipProvisioner for RecordingProvisioner {
        async fn provision(&self, user_id: UserId, org_id: OrgId, role: &str) -> Result<()> {
            self.grants
                .write()
                .expect("lock poisoned")
                .push((user_id, org_id, role.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingIssuer {
        issued: AtomicUsize,
    }

    #[async_trait]
    impl SessionIssuer for CountingIssuer {
        async fn issue_anonymous(
            &self,
            _claims: crate::session::ScopeClaims,
        ) -> Result<SessionTokens> {
            Err(VerifyError::Session("not used here".to_string()))
        }

        async fn issue_member(&self, user_id: UserId, org_id: OrgId) -> Result<SessionTokens> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(SessionTokens {
                access_token: format!("{user_id}:{org_id}"),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    struct Fixture {
        acceptance: InviteAcceptance,
        store: Arc<InMemoryInviteStore>,
        provisioner: Arc<RecordingProvisioner>,
        codec: TokenCodec,
    }

    fn fixture() -> Fixture {
        let codec = TokenCodec::new(b"test-signing-key".to_vec());
        let store = Arc::new(InMemoryInviteStore::new());
        let provisioner = Arc::new(RecordingProvisioner::default());
        let acceptance = InviteAcceptance::new(
            codec.clone(),
            store.clone(),
            provisioner.clone(),
            Arc::new(CountingIssuer::default()),
        );
        Fixture {
            acceptance,
            store,
            provisioner,
            codec,
        }
    }

    fn seed_invite(f: &Fixture, email: &str, ttl: Duration) -> InviteRecord {
        let org_id = OrgId::new();
        let expires_at = Utc::now() + ttl;
        let binding = TokenBinding::new(org_id.to_string(), email.to_string());
        let signed = f
            .codec
            .sign(Purpose::OrgInvite, &binding, expires_at)
            .unwrap();

        let invite = InviteRecord {
            id: InviteId::new(),
            org_id,
            recipient_email: email.to_string(),
            role: "member".to_string(),
            status: InviteStatus::Pending,
            token: signed.token,
            secret: signed.secret,
            expires_at,
        };
        f.store.put(invite.clone());
        invite
    }

    #[tokio::test]
    async fn accept_happy_path() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::days(7));

        let accepted = f
            .acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap();

        assert_eq!(accepted.org_id, invite.org_id);
        assert_eq!(accepted.role, "member");
        assert_eq!(
            f.store.get(invite.id).unwrap().status,
            InviteStatus::Accepted
        );
    }

    #[tokio::test]
    async fn accept_is_case_insensitive_on_email() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::days(7));

        f.acceptance
            .accept(&invite.token, "Alice@Example.COM")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wrong_caller_email_is_rejected_without_state_change() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::days(7));

        let err = f
            .acceptance
            .accept(&invite.token, "mallory@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::EmailMismatch));
        assert_eq!(err.to_string(), "could not verify email");

        // still pending; the real recipient can accept later
        assert_eq!(
            f.store.get(invite.id).unwrap().status,
            InviteStatus::Pending
        );
        f.acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let f = fixture();
        let err = f
            .acceptance
            .accept("no-such-token", "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotFound));
    }

    #[tokio::test]
    async fn second_acceptance_is_already_completed() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::days(7));

        f.acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap();
        let err = f
            .acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::AlreadyCompleted));
    }

    #[tokio::test]
    async fn expired_invite_is_retired_and_terminal() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::seconds(-1));

        let err = f
            .acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::TokenExpired));
        assert_eq!(
            f.store.get(invite.id).unwrap().status,
            InviteStatus::Expired
        );

        // terminal: presenting again reports expiry without re-checking
        let err = f
            .acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::TokenExpired));
    }

    #[tokio::test]
    async fn tampered_secret_is_invalid() {
        let f = fixture();
        let mut invite = seed_invite(&f, "alice@example.com", Duration::days(7));
        invite.secret[0] ^= 0xFF;
        f.store.put(invite.clone());

        let err = f
            .acceptance
            .accept(&invite.token, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::TokenInvalid));
        assert_eq!(
            f.store.get(invite.id).unwrap().status,
            InviteStatus::Pending
        );
    }

    #[tokio::test]
    async fn accept_and_join_provisions_and_opens_session() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::days(7));
        let user_id = UserId::new();

        let (accepted, tokens) = f
            .acceptance
            .accept_and_join(&invite.token, "alice@example.com", user_id)
            .await
            .unwrap();

        assert_eq!(accepted.org_id, invite.org_id);
        assert!(!tokens.access_token.is_empty());

        let grants = f.provisioner.grants.read().unwrap().clone();
        assert_eq!(grants, vec![(user_id, invite.org_id, "member".to_string())]);
    }

    #[tokio::test]
    async fn accept_and_join_does_not_provision_on_failure() {
        let f = fixture();
        let invite = seed_invite(&f, "alice@example.com", Duration::days(7));
        let user_id = UserId::new();

        let err = f
            .acceptance
            .accept_and_join(&invite.token, "mallory@example.com", user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::EmailMismatch));
        assert!(f.provisioner.grants.read().unwrap().is_empty());
    }
}
