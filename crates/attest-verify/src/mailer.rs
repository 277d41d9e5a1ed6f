//! Outbound verification email dispatch.
//!
//! The engine hands finished emails to a [`Mailer`] and treats enqueue
//! failure as fatal for the request: a token nobody can receive is useless,
//! so the caller must see the failure rather than a silent success.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use attest_core::Purpose;

use crate::error::VerifyError;

/// A verification email ready for dispatch.
#[derive(Debug, Clone)]
pub struct VerificationEmail {
    /// The flow this email belongs to; selects the template downstream.
    pub purpose: Purpose,
    /// Destination address.
    pub recipient: String,
    /// The public token to embed in the link.
    pub token: String,
    /// When the embedded token expires.
    pub expires_at: DateTime<Utc>,
}

/// Queues verification emails for delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Enqueue an email for delivery, returning the queue job id.
    async fn enqueue(&self, email: VerificationEmail) -> Result<Uuid, VerifyError>;
}

/// Recording mailer for tests: captures every enqueued email and can be
/// switched to fail on demand.
#[derive(Debug, Default)]
pub struct MockMailer {
    sent: RwLock<Vec<VerificationEmail>>,
    fail: AtomicBool,
}

impl MockMailer {
    /// Create a new recording mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `enqueue` calls fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every email enqueued so far, in order.
    pub fn sent(&self) -> Vec<VerificationEmail> {
        self.sent.read().expect("lock poisoned").clone()
    }

    /// Number of emails enqueued so far.
    pub fn sent_count(&self) -> usize {
        self.sent.read().expect("lock poisoned").len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn enqueue(&self, email: VerificationEmail) -> Result<Uuid, VerifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VerifyError::Dispatch("queue unavailable".to_string()));
        }
        self.sent.write().expect("lock poisoned").push(email);
        Ok(Uuid::new_v4())
    }
}
