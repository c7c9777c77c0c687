use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use bulletin_types::notification::{DeliveryReceipt, NotificationEnvelope};

use crate::credential::CredentialCache;
use crate::provider::{DeliveryError, DeliveryProvider};
use crate::retry::RetryPolicy;

/// Delivers envelopes through a [`DeliveryProvider`].
///
/// Cheap to clone; clones share the provider and the credential cache.
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    provider: Arc<dyn DeliveryProvider>,
    credentials: CredentialCache,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(provider: Arc<dyn DeliveryProvider>, policy: RetryPolicy, credential_lifetime: Duration) -> Self {
        info!(
            provider = provider.name(),
            max_retries = policy.max_retries,
            "Notification dispatcher ready"
        );
        Self {
            inner: Arc::new(DispatcherInner {
                provider,
                credentials: CredentialCache::new(credential_lifetime),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Number of credential acquisitions performed so far.
    pub fn credential_refreshes(&self) -> u64 {
        self.inner.credentials.refreshes()
    }

    /// Deliver one envelope.
    ///
    /// Transient failures are retried with backoff up to `max_retries` times.
    /// A rejected credential is refreshed once and the send repeated once.
    /// Permanent refusals return immediately. The whole call is bounded by
    /// the policy deadline.
    pub async fn send(&self, envelope: &NotificationEnvelope) -> Result<DeliveryReceipt, DeliveryError> {
        let deadline = self.inner.policy.deadline;
        match tokio::time::timeout_at(Instant::now() + deadline, self.deliver(envelope)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    route = envelope.target.kind(),
                    to = envelope.target.name(),
                    "Delivery abandoned after {:?}",
                    deadline
                );
                Err(DeliveryError::DeadlineExceeded(deadline))
            }
        }
    }

    async fn deliver(&self, envelope: &NotificationEnvelope) -> Result<DeliveryReceipt, DeliveryError> {
        let inner = &self.inner;
        let mut retries = 0u32;
        let mut refreshed = false;

        loop {
            let credential = inner.credentials.get(inner.provider.as_ref()).await?;
            let attempt = retries + u32::from(refreshed) + 1;

            match inner.provider.send_message(&credential, envelope).await {
                Ok(receipt) => {
                    debug!(
                        route = envelope.target.kind(),
                        to = envelope.target.name(),
                        message_id = %receipt.message_id,
                        attempt,
                        "Notification delivered"
                    );
                    return Ok(receipt);
                }
                Err(DeliveryError::Authorization(reason)) if !refreshed => {
                    warn!(attempt, "Delivery credential rejected, refreshing: {}", reason);
                    inner.credentials.invalidate(&credential).await;
                    refreshed = true;
                }
                Err(DeliveryError::Transient(reason)) if retries < inner.policy.max_retries => {
                    retries += 1;
                    let delay = inner.policy.delay_for(retries);
                    warn!(attempt, "Transient delivery failure, retrying in {:?}: {}", delay, reason);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        route = envelope.target.kind(),
                        to = envelope.target.name(),
                        attempt,
                        "Delivery failed: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}
