//! Anonymous session bootstrap for public surfaces.
//!
//! Trust center pages and questionnaire links are reachable without an
//! account. Rather than widening those endpoints to unauthenticated access,
//! visitors get a short-lived scoped session up front: the subject and the
//! allowed scopes are fixed at issuance and checked on every request.
//! Anonymous claims never rotate; when they lapse the client bootstraps a
//! fresh session.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use attest_core::{AssessmentId, OrgId, TrustCenterId, UserId};

use crate::error::{Result, VerifyError};

/// Default lifetime of an anonymous session.
pub const DEFAULT_ANONYMOUS_TTL_MINUTES: i64 = 60;

/// The anonymous principal a scoped session speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnonymousSubject {
    /// A visitor browsing a published trust center.
    TrustCenterVisitor {
        /// The trust center the session is scoped to.
        trust_center_id: TrustCenterId,
    },
    /// An external respondent filling in a questionnaire.
    QuestionnaireRespondent {
        /// The assessment being answered.
        assessment_id: AssessmentId,
        /// The respondent's self-declared email, recorded with answers.
        email: String,
    },
}

/// Claims carried by an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeClaims {
    /// Who the session speaks for.
    pub subject: AnonymousSubject,
    /// The operations the session may perform.
    pub scopes: Vec<String>,
    /// Hard expiry; anonymous sessions never rotate.
    pub expires_at: DateTime<Utc>,
}

impl ScopeClaims {
    /// Whether the claims are still valid at the current clock.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// A set of session tokens handed to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Mints session tokens. Implemented by the deployment's session subsystem.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    /// Issue a session for an anonymous principal from its claims.
    async fn issue_anonymous(&self, claims: ScopeClaims) -> Result<SessionTokens>;

    /// Issue a full session for an authenticated member of an organization.
    async fn issue_member(&self, user_id: UserId, org_id: OrgId) -> Result<SessionTokens>;
}

/// Resolves the public entities anonymous sessions can be scoped to.
#[async_trait]
pub trait AnonymousDirectory: Send + Sync {
    /// Resolve a published trust center by its public slug.
    async fn find_trust_center(&self, slug: &str) -> Result<Option<TrustCenterId>>;

    /// Whether an assessment exists and accepts external responses.
    async fn assessment_accepts_responses(&self, assessment_id: AssessmentId) -> Result<bool>;
}

/// Issues scoped anonymous sessions for public surfaces.
pub struct AnonymousSessionBootstrap {
    directory: Arc<dyn AnonymousDirectory>,
    issuer: Arc<dyn SessionIssuer>,
    ttl: Duration,
}

impl AnonymousSessionBootstrap {
    /// Create a bootstrap with the default session lifetime.
    #[must_use]
    pub fn new(directory: Arc<dyn AnonymousDirectory>, issuer: Arc<dyn SessionIssuer>) -> Self {
        Self {
            directory,
            issuer,
            ttl: Duration::minutes(DEFAULT_ANONYMOUS_TTL_MINUTES),
        }
    }

    /// Override the session lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Bootstrap a read-only session for a trust center visitor.
    pub async fn bootstrap_trust_center(&self, slug: &str) -> Result<SessionTokens> {
        if slug.is_empty() {
            return Err(VerifyError::MissingField("slug"));
        }

        let trust_center_id = self
            .directory
            .find_trust_center(slug)
            .await?
            .ok_or(VerifyError::NotFound)?;

        let claims = ScopeClaims {
            subject: AnonymousSubject::TrustCenterVisitor { trust_center_id },
            scopes: vec!["trust_center:read".to_string()],
            expires_at: Utc::now() + self.ttl,
        };

        tracing::info!(
            trust_center_id = %trust_center_id,
            "bootstrapped anonymous trust center session"
        );

        self.issuer.issue_anonymous(claims).await
    }

    /// Bootstrap a response session for a questionnaire respondent.
    pub async fn bootstrap_respondent(
        &self,
        assessment_id: AssessmentId,
        email: &str,
    ) -> Result<SessionTokens> {
        if email.is_empty() {
            return Err(VerifyError::MissingField("email"));
        }

        if !self
            .directory
            .assessment_accepts_responses(assessment_id)
            .await?
        {
            return Err(VerifyError::NotFound);
        }

        let claims = ScopeClaims {
            subject: AnonymousSubject::QuestionnaireRespondent {
                assessment_id,
                email: email.to_string(),
            },
            scopes: vec!["questionnaire:respond".to_string()],
            expires_at: Utc::now() + self.ttl,
        };

        tracing::info!(
            assessment_id = %assessment_id,
            "bootstrapped anonymous respondent session"
        );

        self.issuer.issue_anonymous(claims).await
    }

    /// Check anonymous claims against the clock. Lapsed claims are simply
    /// expired; the client starts over with a fresh bootstrap.
    pub fn verify_claims(&self, claims: &ScopeClaims) -> Result<()> {
        if !claims.is_live() {
            return Err(VerifyError::TokenExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Directory backed by in-memory maps.
    #[derive(Default)]
    struct StaticDirectory {
        trust_centers: RwLock<HashMap<String, TrustCenterId>>,
        assessments: RwLock<HashMap<AssessmentId, bool>>,
    }

    #[async_trait]
    impl AnonymousDirectory for StaticDirectory {
        async fn find_trust_center(&self, slug: &str) -> Result<Option<TrustCenterId>> {
            Ok(self
                .trust_centers
                .read()
                .expect("lock poisoned")
                .get(slug)
                .copied())
        }

        async fn assessment_accepts_responses(
            &self,
            assessment_id: AssessmentId,
        ) -> Result<bool> {
            Ok(self
                .assessments
                .read()
                .expect("lock poisoned")
                .get(&assessment_id)
                .copied()
                .unwrap_or(false))
        }
    }

    /// Issuer that encodes the claims back into the token for inspection.
    struct EchoIssuer;

    #[async_trait]
    impl SessionIssuer for EchoIssuer {
        async fn issue_anonymous(&self, claims: ScopeClaims) -> Result<SessionTokens> {
            let access_token = serde_json::to_string(&claims)
                .map_err(|e| VerifyError::Session(e.to_string()))?;
            Ok(SessionTokens {
                access_token,
                expires_at: claims.expires_at,
            })
        }

        async fn issue_member(&self, user_id: UserId, org_id: OrgId) -> Result<SessionTokens> {
            Ok(SessionTokens {
                access_token: format!("{user_id}:{org_id}"),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    fn bootstrap_with(directory: StaticDirectory) -> AnonymousSessionBootstrap {
        AnonymousSessionBootstrap::new(Arc::new(directory), Arc::new(EchoIssuer))
    }

    #[tokio::test]
    async fn trust_center_session_is_read_scoped() {
        let directory = StaticDirectory::default();
        let tc_id = TrustCenterId::new();
        directory
            .trust_centers
            .write()
            .unwrap()
            .insert("acme".to_string(), tc_id);

        let tokens = bootstrap_with(directory)
            .bootstrap_trust_center("acme")
            .await
            .unwrap();

        let claims: ScopeClaims = serde_json::from_str(&tokens.access_token).unwrap();
        assert_eq!(
            claims.subject,
            AnonymousSubject::TrustCenterVisitor {
                trust_center_id: tc_id
            }
        );
        assert_eq!(claims.scopes, vec!["trust_center:read"]);
        assert!(claims.is_live());
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let err = bootstrap_with(StaticDirectory::default())
            .bootstrap_trust_center("nope")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotFound));
    }

    #[tokio::test]
    async fn empty_slug_rejected_before_lookup() {
        let err = bootstrap_with(StaticDirectory::default())
            .bootstrap_trust_center("")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingField("slug")));
    }

    #[tokio::test]
    async fn respondent_session_carries_email() {
        let directory = StaticDirectory::default();
        let assessment_id = AssessmentId::new();
        directory
            .assessments
            .write()
            .unwrap()
            .insert(assessment_id, true);

        let tokens = bootstrap_with(directory)
            .bootstrap_respondent(assessment_id, "vendor@example.com")
            .await
            .unwrap();

        let claims: ScopeClaims = serde_json::from_str(&tokens.access_token).unwrap();
        assert_eq!(
            claims.subject,
            AnonymousSubject::QuestionnaireRespondent {
                assessment_id,
                email: "vendor@example.com".to_string()
            }
        );
        assert_eq!(claims.scopes, vec!["questionnaire:respond"]);
    }

    #[tokio::test]
    async fn closed_assessment_is_not_found() {
        let directory = StaticDirectory::default();
        let assessment_id = AssessmentId::new();
        directory
            .assessments
            .write()
            .unwrap()
            .insert(assessment_id, false);

        let err = bootstrap_with(directory)
            .bootstrap_respondent(assessment_id, "vendor@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotFound));
    }

    #[tokio::test]
    async fn lapsed_claims_expire_without_rotation() {
        let bootstrap = bootstrap_with(StaticDirectory::default());
        let claims = ScopeClaims {
            subject: AnonymousSubject::TrustCenterVisitor {
                trust_center_id: TrustCenterId::new(),
            },
            scopes: vec!["trust_center:read".to_string()],
            expires_at: Utc::now() - Duration::seconds(1),
        };

        let err = bootstrap.verify_claims(&claims).unwrap_err();
        assert!(matches!(err, VerifyError::TokenExpired));
    }
}
