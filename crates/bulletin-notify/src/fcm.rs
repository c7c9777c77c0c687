//! Firebase Cloud Messaging (HTTP v1) provider.
//!
//! Credentials come from a Google service-account key: a signed RS256
//! assertion is exchanged at the key's `token_uri` for an OAuth2 access
//! token, which then authorizes `messages:send` calls.

use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

use futures_util::future::BoxFuture;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use bulletin_types::notification::{DeliveryReceipt, DeliveryTarget, NotificationEnvelope};

use crate::provider::{CredentialError, DeliveryCredential, DeliveryError, DeliveryProvider};

pub const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The fields of a Google service-account JSON key that matter here.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CredentialError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CredentialError> {
        serde_json::from_str(raw).map_err(|e| CredentialError::Config(format!("service account key: {e}")))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

pub struct FcmProvider {
    client: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    endpoint: String,
}

impl FcmProvider {
    /// Parses the private key up front so a bad key fails at startup.
    pub fn new(key: ServiceAccountKey, endpoint: impl Into<String>) -> Result<Self, CredentialError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| CredentialError::Config(format!("private key: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CredentialError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            key,
            signing_key,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn assertion(&self) -> Result<String, CredentialError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| CredentialError::Config(format!("signing assertion: {e}")))
    }

    fn send_url(&self) -> String {
        format!("{}/v1/projects/{}/messages:send", self.endpoint, self.key.project_id)
    }
}

impl DeliveryProvider for FcmProvider {
    fn name(&self) -> &'static str {
        "fcm"
    }

    fn acquire_credential(&self) -> BoxFuture<'_, Result<DeliveryCredential, CredentialError>> {
        Box::pin(async move {
            let assertion = self.assertion()?;
            let resp = self
                .client
                .post(&self.key.token_uri)
                .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
                .send()
                .await
                .map_err(|e| CredentialError::Unreachable(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(if status.is_client_error() {
                    CredentialError::Rejected(format!("{status}: {body}"))
                } else {
                    CredentialError::Unreachable(format!("{status}: {body}"))
                });
            }

            let token: TokenResponse = resp
                .json()
                .await
                .map_err(|e| CredentialError::Unreachable(format!("token response: {e}")))?;
            debug!(expires_in = ?token.expires_in, "Obtained FCM access token");

            Ok(DeliveryCredential {
                token: token.access_token,
                expires_in: token.expires_in.map(Duration::from_secs),
            })
        })
    }

    fn send_message<'a>(
        &'a self,
        credential: &'a DeliveryCredential,
        envelope: &'a NotificationEnvelope,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, DeliveryError>> {
        Box::pin(async move {
            let body = json!({
                "message": {
                    "topic": topic_for(&envelope.target),
                    "notification": {
                        "title": envelope.title,
                        "body": envelope.body,
                    },
                }
            });

            let resp = self
                .client
                .post(self.send_url())
                .bearer_auth(&credential.token)
                .json(&body)
                .send()
                .await
                .map_err(|e| DeliveryError::Transient(e.to_string()))?;

            let status = resp.status();
            if status.is_success() {
                let sent: SendResponse = resp
                    .json()
                    .await
                    .map_err(|e| DeliveryError::Transient(format!("send response: {e}")))?;
                return Ok(DeliveryReceipt { message_id: sent.name });
            }

            let message = resp.text().await.unwrap_or_default();
            Err(classify(status, message))
        })
    }
}

fn classify(status: StatusCode, message: String) -> DeliveryError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DeliveryError::Authorization(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => DeliveryError::Transient(message),
        s if s.is_server_error() => DeliveryError::Transient(format!("{s}: {message}")),
        s => DeliveryError::Permanent {
            status: s.as_u16(),
            message,
        },
    }
}

/// FCM topic for a target. Recipients get a per-user topic `user-<name>`
/// that their devices subscribe to.
pub fn topic_for(target: &DeliveryTarget) -> String {
    match target {
        DeliveryTarget::Topic(name) => encode_topic(name),
        DeliveryTarget::Recipient(user) => format!("user-{}", encode_topic(user)),
    }
}

/// Percent-encode everything outside FCM's topic alphabet `[a-zA-Z0-9-_.~%]`.
fn encode_topic(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}
