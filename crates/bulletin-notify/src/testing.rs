//! Scripted [`DeliveryProvider`] for tests in this and dependent crates.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;

use bulletin_types::notification::{DeliveryReceipt, NotificationEnvelope};

use crate::provider::{CredentialError, DeliveryCredential, DeliveryError, DeliveryProvider};

/// What the next `send_message` call should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Deliver,
    Transient,
    Unauthorized,
    Refused(u16),
}

/// Records every send and plays back queued outcomes.
///
/// Once the queue is empty every send succeeds. Credentials are numbered
/// `token-1`, `token-2`, ... in acquisition order.
#[derive(Default)]
pub struct ScriptedProvider {
    outcomes: Mutex<VecDeque<Outcome>>,
    delivered: Mutex<Vec<NotificationEnvelope>>,
    tokens_used: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    acquisitions: AtomicUsize,
    acquire_delay: Option<Duration>,
    expires_in: Option<Duration>,
    fail_acquire: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        lock(&self.outcomes).extend(outcomes);
        self
    }

    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = Some(delay);
        self
    }

    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Every credential acquisition fails with `Unreachable`.
    pub fn without_credentials(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn push_outcome(&self, outcome: Outcome) {
        lock(&self.outcomes).push_back(outcome);
    }

    /// Envelopes that were accepted, in order.
    pub fn delivered(&self) -> Vec<NotificationEnvelope> {
        lock(&self.delivered).clone()
    }

    /// Token presented on each send attempt, in order.
    pub fn tokens_used(&self) -> Vec<String> {
        lock(&self.tokens_used).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl DeliveryProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn acquire_credential(&self) -> BoxFuture<'_, Result<DeliveryCredential, CredentialError>> {
        Box::pin(async move {
            if let Some(delay) = self.acquire_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_acquire {
                return Err(CredentialError::Unreachable("scripted outage".into()));
            }
            let n = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(DeliveryCredential {
                token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        })
    }

    fn send_message<'a>(
        &'a self,
        credential: &'a DeliveryCredential,
        envelope: &'a NotificationEnvelope,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, DeliveryError>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            lock(&self.tokens_used).push(credential.token.clone());

            let outcome = lock(&self.outcomes).pop_front().unwrap_or(Outcome::Deliver);
            match outcome {
                Outcome::Deliver => {
                    lock(&self.delivered).push(envelope.clone());
                    Ok(DeliveryReceipt {
                        message_id: format!("msg-{attempt}"),
                    })
                }
                Outcome::Transient => Err(DeliveryError::Transient("scripted 503".into())),
                Outcome::Unauthorized => Err(DeliveryError::Authorization("scripted 401".into())),
                Outcome::Refused(status) => Err(DeliveryError::Permanent {
                    status,
                    message: "scripted refusal".into(),
                }),
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
