use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

use bulletin_types::notification::{DeliveryReceipt, NotificationEnvelope};

/// Short-lived bearer token for the push transport.
#[derive(Clone, PartialEq, Eq)]
pub struct DeliveryCredential {
    pub token: String,
    /// Lifetime reported by the credential source, if any.
    pub expires_in: Option<Duration>,
}

impl std::fmt::Debug for DeliveryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCredential")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("credential source unreachable: {0}")]
    Unreachable(String),
    #[error("credential source rejected the service identity: {0}")]
    Rejected(String),
    #[error("invalid credential configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network failure, timeout or 5xx-class response. Worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// The provider rejected the credential.
    #[error("delivery credential rejected: {0}")]
    Authorization(String),
    /// The provider refused the message itself. Retrying will not help.
    #[error("delivery refused with status {status}: {message}")]
    Permanent { status: u16, message: String },
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("delivery did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Push transport boundary.
///
/// Implementations map [`DeliveryTarget`](bulletin_types::notification::DeliveryTarget)
/// to their own addressing and classify failures; they never retry.
pub trait DeliveryProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn acquire_credential(&self) -> BoxFuture<'_, Result<DeliveryCredential, CredentialError>>;

    fn send_message<'a>(
        &'a self,
        credential: &'a DeliveryCredential,
        envelope: &'a NotificationEnvelope,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, DeliveryError>>;
}

/// Provider that only writes envelopes to the `tracing` log.
///
/// Used when no push credentials are configured.
#[derive(Default)]
pub struct TracingProvider {
    sent: AtomicU64,
}

impl TracingProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeliveryProvider for TracingProvider {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn acquire_credential(&self) -> BoxFuture<'_, Result<DeliveryCredential, CredentialError>> {
        Box::pin(async {
            Ok(DeliveryCredential {
                token: "local".to_string(),
                expires_in: None,
            })
        })
    }

    fn send_message<'a>(
        &'a self,
        _credential: &'a DeliveryCredential,
        envelope: &'a NotificationEnvelope,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, DeliveryError>> {
        Box::pin(async move {
            let seq = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(
                route = envelope.target.kind(),
                to = envelope.target.name(),
                title = %envelope.title,
                "{}",
                envelope.body,
            );
            Ok(DeliveryReceipt {
                message_id: format!("local-{seq}"),
            })
        })
    }
}
