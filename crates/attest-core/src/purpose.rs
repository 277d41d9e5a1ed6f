//! Verification purposes.
//!
//! A [`Purpose`] names the flow a verification token belongs to. The purpose
//! is folded into the token's signing context and stored alongside the token
//! record, so a token minted for one flow can never validate under another.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// The verification flow a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Confirming ownership of a user's email address after registration.
    EmailVerification,
    /// A time-limited password reset link.
    PasswordReset,
    /// Double opt-in confirmation for a subscriber.
    SubscriberConfirm,
    /// An invitation to join an organization.
    OrgInvite,
}

impl Purpose {
    /// String form used for database columns and signing contexts.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::EmailVerification => "email_verification",
            Purpose::PasswordReset => "password_reset",
            Purpose::SubscriberConfirm => "subscriber_confirm",
            Purpose::OrgInvite => "org_invite",
        }
    }

    /// All purposes, in a stable order.
    #[must_use]
    pub fn all() -> [Purpose; 4] {
        [
            Purpose::EmailVerification,
            Purpose::PasswordReset,
            Purpose::SubscriberConfirm,
            Purpose::OrgInvite,
        ]
    }
}

impl Display for Purpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown purpose string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown verification purpose: {0}")]
pub struct ParsePurposeError(pub String);

impl FromStr for Purpose {
    type Err = ParsePurposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_verification" => Ok(Purpose::EmailVerification),
            "password_reset" => Ok(Purpose::PasswordReset),
            "subscriber_confirm" => Ok(Purpose::SubscriberConfirm),
            "org_invite" => Ok(Purpose::OrgInvite),
            other => Err(ParsePurposeError(other.to_string())),
        }
    }
}
