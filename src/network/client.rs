//! Outbound P2P client seam and its REST implementation.

use crate::error::NetworkError;
use crate::types::{NodeInfo, PushBatchRequest, ResendRequest};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound calls the reconciliation engine makes against a peer. Every
/// method returns `Ok(false)` for a definitive remote rejection and `Err`
/// for transport failures; callers treat both as the same failure path.
#[async_trait::async_trait]
pub trait P2pClient: Send + Sync {
    /// Announce this node to `url`.
    async fn send_party_info(&self, url: &str, info: &NodeInfo) -> Result<bool, NetworkError>;

    /// Ask `url` to resend transactions for the request's recipient key.
    async fn make_resend_request(
        &self,
        url: &str,
        request: &ResendRequest,
    ) -> Result<bool, NetworkError>;

    /// Push one raw encoded payload to `url`.
    async fn push_payload(&self, url: &str, payload: &[u8]) -> Result<bool, NetworkError>;

    /// Push a batch of encoded payloads to `url`.
    async fn push_batch(&self, url: &str, batch: &PushBatchRequest)
        -> Result<bool, NetworkError>;
}

/// REST client over reqwest. Paths mirror the wire protocol:
/// `partyinfo`, `resend`, `push`, `pushBatch` under the peer's base url.
pub struct RestP2pClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl RestP2pClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    /// The per-request timeout every outbound call is bounded by.
    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(base: &str, path: &str) -> String {
        let trimmed = base.trim_end_matches('/');
        format!("{trimmed}/{path}")
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: String,
        body: &T,
    ) -> Result<bool, NetworkError> {
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| NetworkError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status.is_client_error() {
            tracing::debug!("Peer {} rejected request with status {}", url, status);
            Ok(false)
        } else {
            Err(NetworkError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }
}

impl Default for RestP2pClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl P2pClient for RestP2pClient {
    async fn send_party_info(&self, url: &str, info: &NodeInfo) -> Result<bool, NetworkError> {
        self.post_json(Self::endpoint(url, "partyinfo"), info).await
    }

    async fn make_resend_request(
        &self,
        url: &str,
        request: &ResendRequest,
    ) -> Result<bool, NetworkError> {
        self.post_json(Self::endpoint(url, "resend"), request).await
    }

    async fn push_payload(&self, url: &str, payload: &[u8]) -> Result<bool, NetworkError> {
        let target = Self::endpoint(url, "push");
        let response = self
            .client
            .post(&target)
            .header("content-type", "application/octet-stream")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| NetworkError::Request {
                url: target.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status.is_client_error() {
            Ok(false)
        } else {
            Err(NetworkError::Status {
                url: target,
                status: status.as_u16(),
            })
        }
    }

    async fn push_batch(
        &self,
        url: &str,
        batch: &PushBatchRequest,
    ) -> Result<bool, NetworkError> {
        self.post_json(Self::endpoint(url, "pushBatch"), batch).await
    }
}
