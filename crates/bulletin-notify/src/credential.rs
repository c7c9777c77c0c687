use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::provider::{CredentialError, DeliveryCredential, DeliveryProvider};

/// Tokens are dropped this long before the provider says they expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

struct Cached {
    credential: DeliveryCredential,
    valid_until: Instant,
}

/// Lazily refreshed credential shared by every sender.
///
/// The slot lock is held while a fresh credential is acquired, so callers
/// that arrive during a refresh wait for it instead of starting another.
pub struct CredentialCache {
    slot: Mutex<Option<Cached>>,
    max_lifetime: Duration,
    refreshes: AtomicU64,
}

impl CredentialCache {
    pub fn new(max_lifetime: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            max_lifetime,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return the cached credential, acquiring a new one if absent or stale.
    pub async fn get(&self, provider: &dyn DeliveryProvider) -> Result<DeliveryCredential, CredentialError> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.valid_until {
                return Ok(cached.credential.clone());
            }
        }

        debug!(provider = provider.name(), "Acquiring delivery credential");
        let credential = provider.acquire_credential().await?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let lifetime = match credential.expires_in {
            Some(reported) => reported.saturating_sub(EXPIRY_SKEW).min(self.max_lifetime),
            None => self.max_lifetime,
        };
        *slot = Some(Cached {
            credential: credential.clone(),
            valid_until: Instant::now() + lifetime,
        });

        Ok(credential)
    }

    /// Forget `rejected` so the next `get` refreshes.
    ///
    /// A no-op if the slot already holds a different token, which happens when
    /// several senders saw the same rejection and one of them refreshed first.
    pub async fn invalidate(&self, rejected: &DeliveryCredential) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|c| c.credential.token == rejected.token) {
            *slot = None;
        }
    }

    /// Number of successful acquisitions so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}
