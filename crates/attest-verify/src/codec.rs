//! Token signing and verification.
//!
//! A [`TokenCodec`] turns a (purpose, binding, expiry) triple into an opaque
//! public token string plus a private secret. The token is an HMAC signature
//! over the purpose-scoped message, keyed by a per-issuance secret; the
//! secret itself is anchored to the process-wide signing key so a secret
//! minted elsewhere can never validate here.
//!
//! Signing and verification are pure functions of (key, inputs); all side
//! effects live in the callers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;

use attest_core::Purpose;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Size of the random nonce prefix of a secret (512 bits).
pub const NONCE_BYTES: usize = 64;

/// Total size of a token secret: nonce plus keyed half.
pub const SECRET_BYTES: usize = 128;

/// Verification failure modes.
///
/// [`CodecError::Expired`] is the only recoverable failure: the signature
/// machinery was sound but the clock has passed `expires_at`. Everything
/// else is terminal and must never trigger rotation, otherwise a bad token
/// becomes a free guess-and-reissue oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The binding is missing its email address.
    #[error("token is missing email address")]
    MissingEmail,

    /// The binding is missing its subject identifier.
    #[error("token is missing subject")]
    MissingSubject,

    /// The clock has passed the token's expiry. Recoverable.
    #[error("token has expired")]
    Expired,

    /// The secret is absent or has the wrong length.
    #[error("invalid secret for token verification")]
    InvalidSecret,

    /// Signature mismatch, or the secret was not minted by this process's
    /// signing key. Terminal.
    #[error("token is invalid")]
    Invalid,
}

/// The identity a token is bound to.
///
/// For user-scoped purposes the subject carries the user or subscriber id;
/// for organization invites it carries the destination organization id, so
/// the invite binds email + organization rather than a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBinding {
    /// Subject identifier folded into the signed message.
    pub subject: String,
    /// Email address folded into the signed message.
    pub email: String,
}

impl TokenBinding {
    /// Binding for a subject id + email pair.
    #[must_use]
    pub fn new(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
        }
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// Opaque public token string, safe to embed in a URL.
    pub token: String,
    /// Private verification bytes; persisted, never sent to the client.
    pub secret: Vec<u8>,
    /// Absolute expiry the token was signed against.
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies verification tokens.
///
/// Holds the process-wide signing key, immutable after construction. Clone
/// is cheap enough for the handful of services that share it.
#[derive(Clone)]
pub struct TokenCodec {
    signing_key: Vec<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never log key material
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec around the process-wide signing key.
    #[must_use]
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
        }
    }

    /// Sign a (purpose, binding, expiry) triple into a token and secret.
    ///
    /// Every call draws a fresh nonce from the OS CSPRNG, so signing the
    /// same inputs twice yields a different token and secret each time.
    pub fn sign(
        &self,
        purpose: Purpose,
        binding: &TokenBinding,
        expires_at: DateTime<Utc>,
    ) -> std::result::Result<SignedToken, CodecError> {
        check_binding(binding)?;

        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let mut secret = Vec::with_capacity(SECRET_BYTES);
        secret.extend_from_slice(&nonce);
        secret.extend_from_slice(&self.keyed_half(&nonce));

        let token = compute_signature(&secret, purpose, binding, expires_at);

        Ok(SignedToken {
            token,
            secret,
            expires_at,
        })
    }

    /// Verify a token against its persisted secret and expiry.
    ///
    /// The expiry is evaluated against the current clock at call time, not
    /// at issuance: a token that expires between lookup and verification is
    /// reported expired.
    pub fn verify(
        &self,
        purpose: Purpose,
        binding: &TokenBinding,
        token: &str,
        secret: &[u8],
        expires_at: DateTime<Utc>,
    ) -> std::result::Result<(), CodecError> {
        check_binding(binding)?;

        if expires_at <= Utc::now() {
            return Err(CodecError::Expired);
        }

        if secret.len() != SECRET_BYTES {
            return Err(CodecError::InvalidSecret);
        }

        // The keyed half of the secret must have been derived from this
        // process's signing key; otherwise the secret belongs to some other
        // deployment (or was fabricated).
        let expected_half = self.keyed_half(&secret[..NONCE_BYTES]);
        if expected_half.ct_eq(&secret[NONCE_BYTES..]).unwrap_u8() == 0 {
            return Err(CodecError::Invalid);
        }

        let expected = compute_signature(secret, purpose, binding, expires_at);
        if expected.as_bytes().ct_eq(token.as_bytes()).unwrap_u8() == 0 {
            return Err(CodecError::Invalid);
        }

        Ok(())
    }

    /// Derive the keyed half of a secret from its nonce.
    fn keyed_half(&self, nonce: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha512::new_from_slice(&self.signing_key)
            .expect("HMAC can take key of any size");
        mac.update(nonce);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Structural validation shared by sign and verify.
fn check_binding(binding: &TokenBinding) -> std::result::Result<(), CodecError> {
    if binding.email.is_empty() {
        return Err(CodecError::MissingEmail);
    }
    if binding.subject.is_empty() {
        return Err(CodecError::MissingSubject);
    }
    Ok(())
}

/// Compute the URL-safe signature over the purpose-scoped message.
fn compute_signature(
    secret: &[u8],
    purpose: Purpose,
    binding: &TokenBinding,
    expires_at: DateTime<Utc>,
) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(purpose.as_str().as_bytes());
    mac.update(b"|");
    mac.update(binding.subject.as_bytes());
    mac.update(b"|");
    mac.update(binding.email.as_bytes());
    mac.update(b"|");
    mac.update(expires_at.timestamp_micros().to_be_bytes().as_slice());

    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    const RUSTY: &str = "rusty.shackleford@example.com";

    fn codec() -> TokenCodec {
        TokenCodec::new(b"test-signing-key".to_vec())
    }

    fn binding() -> TokenBinding {
        TokenBinding::new(Uuid::new_v4().to_string(), RUSTY)
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let codec = codec();
        let binding = binding();
        let expires_at = Utc::now() + Duration::hours(24);

        let signed = codec
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();
        assert!(!signed.token.is_empty());
        assert_eq!(signed.secret.len(), SECRET_BYTES);

        codec
            .verify(
                Purpose::EmailVerification,
                &binding,
                &signed.token,
                &signed.secret,
                expires_at,
            )
            .unwrap();
    }

    #[test]
    fn signing_twice_produces_different_tokens() {
        let codec = codec();
        let binding = binding();
        let expires_at = Utc::now() + Duration::hours(24);

        let first = codec
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();
        let second = codec
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();

        assert_ne!(first.token, second.token);
        assert_ne!(first.secret, second.secret);
    }

    #[test]
    fn purpose_is_folded_into_the_signature() {
        let codec = codec();
        let binding = binding();
        let expires_at = Utc::now() + Duration::hours(1);

        let signed = codec
            .sign(Purpose::PasswordReset, &binding, expires_at)
            .unwrap();

        // Same token string, same secret, same binding: a reset token must
        // not validate under email verification.
        let err = codec
            .verify(
                Purpose::EmailVerification,
                &binding,
                &signed.token,
                &signed.secret,
                expires_at,
            )
            .unwrap_err();
        assert_eq!(err, CodecError::Invalid);
    }

    #[test]
    fn expired_token_reports_expired() {
        let codec = codec();
        let binding = binding();
        let expires_at = Utc::now() - Duration::days(1);

        // Expiry is checked before the signature, so even garbage inputs
        // report expired once the clock has passed.
        let err = codec
            .verify(Purpose::EmailVerification, &binding, "", &[], expires_at)
            .unwrap_err();
        assert_eq!(err, CodecError::Expired);
    }

    #[test]
    fn different_email_reports_invalid() {
        let codec = codec();
        let subject = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::hours(24);

        let signed = codec
            .sign(
                Purpose::EmailVerification,
                &TokenBinding::new(subject.clone(), RUSTY),
                expires_at,
            )
            .unwrap();

        let err = codec
            .verify(
                Purpose::EmailVerification,
                &TokenBinding::new(subject, "sfunk@example.com"),
                &signed.token,
                &signed.secret,
                expires_at,
            )
            .unwrap_err();
        assert_eq!(err, CodecError::Invalid);
    }

    #[test]
    fn missing_email_reports_missing() {
        let codec = codec();
        let err = codec
            .sign(
                Purpose::EmailVerification,
                &TokenBinding::new("subject", ""),
                Utc::now() + Duration::hours(1),
            )
            .unwrap_err();
        assert_eq!(err, CodecError::MissingEmail);
    }

    #[test]
    fn missing_subject_reports_missing() {
        let codec = codec();
        let err = codec
            .sign(
                Purpose::PasswordReset,
                &TokenBinding::new("", RUSTY),
                Utc::now() + Duration::hours(1),
            )
            .unwrap_err();
        assert_eq!(err, CodecError::MissingSubject);
    }

    #[test]
    fn wrong_length_secret_reports_invalid_secret() {
        let codec = codec();
        let binding = binding();
        let expires_at = Utc::now() + Duration::hours(24);

        let signed = codec
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();

        let err = codec
            .verify(
                Purpose::EmailVerification,
                &binding,
                &signed.token,
                &[],
                expires_at,
            )
            .unwrap_err();
        assert_eq!(err, CodecError::InvalidSecret);

        let err = codec
            .verify(
                Purpose::EmailVerification,
                &binding,
                &signed.token,
                b"wronglength",
                expires_at,
            )
            .unwrap_err();
        assert_eq!(err, CodecError::InvalidSecret);
    }

    #[test]
    fn secret_from_another_issuance_reports_invalid() {
        let codec = codec();
        let binding = binding();
        let expires_at = Utc::now() + Duration::hours(24);

        let signed = codec
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();
        let other = codec
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();

        let err = codec
            .verify(
                Purpose::EmailVerification,
                &binding,
                &signed.token,
                &other.secret,
                expires_at,
            )
            .unwrap_err();
        assert_eq!(err, CodecError::Invalid);
    }

    #[test]
    fn secret_from_another_key_reports_invalid() {
        let ours = codec();
        let theirs = TokenCodec::new(b"some-other-deployment".to_vec());
        let binding = binding();
        let expires_at = Utc::now() + Duration::hours(24);

        let signed = theirs
            .sign(Purpose::EmailVerification, &binding, expires_at)
            .unwrap();

        let err = ours
            .verify(
                Purpose::EmailVerification,
                &binding,
                &signed.token,
                &signed.secret,
                expires_at,
            )
            .unwrap_err();
        assert_eq!(err, CodecError::Invalid);
    }

    #[test]
    fn token_is_url_safe() {
        let codec = codec();
        let signed = codec
            .sign(
                Purpose::SubscriberConfirm,
                &binding(),
                Utc::now() + Duration::days(7),
            )
            .unwrap();
        assert!(signed
            .token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
