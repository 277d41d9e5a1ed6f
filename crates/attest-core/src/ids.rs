//! Strongly typed identifiers.
//!
//! Newtype wrappers over [`Uuid`] for every entity the verification core
//! touches. Using distinct types prevents, at compile time, passing a user id
//! where an organization id is expected.
//!
//! # Example
//!
//! ```
//! use attest_core::{OrgId, UserId};
//!
//! let user = UserId::new();
//! let org = OrgId::new();
//!
//! fn requires_org(id: OrgId) -> String {
//!     id.to_string()
//! }
//!
//! let _ = requires_org(org);
//! // requires_org(user); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for users.
    ///
    /// Carried through invitation acceptance, membership provisioning, and
    /// session issuance. Verification-token subjects stay plain UUIDs since
    /// a subject may be a user or a subscriber.
    UserId
);

define_id!(
    /// Strongly typed identifier for organizations.
    ///
    /// Invitation tokens bind the recipient email to a destination
    /// organization via this id.
    OrgId
);

define_id!(
    /// Strongly typed identifier for organization invitations.
    InviteId
);

define_id!(
    /// Strongly typed identifier for trust centers.
    ///
    /// Anonymous visitor sessions are scoped to one of these.
    TrustCenterId
);

define_id!(
    /// Strongly typed identifier for questionnaire assessments.
    ///
    /// Anonymous respondent sessions are scoped to one of these.
    AssessmentId
);
