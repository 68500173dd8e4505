//! Publisher seams for pushing payloads back out to peers.

use crate::error::PublishError;
use crate::network::client::P2pClient;
use crate::network::helper::DiscoveryHelper;
use crate::payload::{EncodedPayload, PayloadCodec};
use crate::types::{PublicKey, PushBatchRequest};
use std::sync::Arc;

/// Bulk push path: deliver an accumulated batch to one target node.
#[async_trait::async_trait]
pub trait ResendBatchPublisher: Send + Sync {
    async fn publish_batch(
        &self,
        payloads: &[EncodedPayload],
        target_url: &str,
    ) -> Result<(), PublishError>;
}

/// Single-payload push path used by the legacy resend-all protocol. The
/// target node is resolved from the recipient key via discovery.
#[async_trait::async_trait]
pub trait PayloadPublisher: Send + Sync {
    async fn publish_payload(
        &self,
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) -> Result<(), PublishError>;
}

pub struct RestResendBatchPublisher {
    p2p_client: Arc<dyn P2pClient>,
    codec: Arc<dyn PayloadCodec>,
}

impl RestResendBatchPublisher {
    pub fn new(p2p_client: Arc<dyn P2pClient>, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { p2p_client, codec }
    }
}

#[async_trait::async_trait]
impl ResendBatchPublisher for RestResendBatchPublisher {
    async fn publish_batch(
        &self,
        payloads: &[EncodedPayload],
        target_url: &str,
    ) -> Result<(), PublishError> {
        let encoded_payloads = payloads
            .iter()
            .map(|p| self.codec.encode(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                PublishError::Network(crate::error::NetworkError::Request {
                    url: target_url.to_string(),
                    reason: e.to_string(),
                })
            })?;

        tracing::debug!(
            "Publishing batch of {} payload(s) to {}",
            encoded_payloads.len(),
            target_url
        );
        let accepted = self
            .p2p_client
            .push_batch(target_url, &PushBatchRequest { encoded_payloads })
            .await?;
        if accepted {
            Ok(())
        } else {
            Err(PublishError::Rejected)
        }
    }
}

pub struct RestPayloadPublisher {
    p2p_client: Arc<dyn P2pClient>,
    codec: Arc<dyn PayloadCodec>,
    helper: Arc<DiscoveryHelper>,
}

impl RestPayloadPublisher {
    pub fn new(
        p2p_client: Arc<dyn P2pClient>,
        codec: Arc<dyn PayloadCodec>,
        helper: Arc<DiscoveryHelper>,
    ) -> Self {
        Self {
            p2p_client,
            codec,
            helper,
        }
    }
}

#[async_trait::async_trait]
impl PayloadPublisher for RestPayloadPublisher {
    async fn publish_payload(
        &self,
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) -> Result<(), PublishError> {
        let target = self
            .helper
            .build_remote_node_info(recipient)
            .map_err(|_| PublishError::UnknownRecipient(recipient.encode()))?;

        let raw = self.codec.encode(payload).map_err(|e| {
            PublishError::Network(crate::error::NetworkError::Request {
                url: target.url.clone(),
                reason: e.to_string(),
            })
        })?;

        tracing::debug!("Publishing payload to {} for {}", target.url, recipient);
        let accepted = self.p2p_client.push_payload(&target.url, &raw).await?;
        if accepted {
            Ok(())
        } else {
            Err(PublishError::Rejected)
        }
    }
}
