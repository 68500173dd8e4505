//! Per-transaction decision-and-publish logic for the bulk resend path.

use crate::enclave::{Enclave, EnclaveStatus};
use crate::error::PublishError;
use crate::network::publish::ResendBatchPublisher;
use crate::network::store::NetworkStore;
use crate::payload::{EncodedPayload, EncodedPayloadBuilder};
use crate::storage::EncryptedTransaction;
use crate::types::PublicKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Working state for one transaction passing through the workflow.
#[derive(Debug, Clone)]
pub struct BatchWorkflowContext {
    pub recipient_key: PublicKey,
    pub encrypted_transaction: EncryptedTransaction,
    pub encoded_payload: EncodedPayload,
    pub batch_size: u64,
}

/// One workflow instance lives for one whole resend-batch call, accumulating
/// outbound payloads per target url and flushing whenever a buffer reaches
/// the batch size. Driven strictly sequentially; the accumulator is not
/// meant for concurrent `execute` calls.
pub struct BatchWorkflow {
    enclave: Arc<dyn Enclave>,
    network_store: Arc<NetworkStore>,
    publisher: Arc<dyn ResendBatchPublisher>,
    expected_total: u64,
    processed: u64,
    published_count: u64,
    buffers: HashMap<String, Vec<EncodedPayload>>,
}

impl BatchWorkflow {
    /// Decide whether and how to forward one transaction to the requesting
    /// key. `Ok(false)` means the transaction was skipped (enclave down, or
    /// the payload does not concern the recipient); `Ok(true)` means it was
    /// accumulated for publishing.
    pub async fn execute(&mut self, context: BatchWorkflowContext) -> Result<bool, PublishError> {
        self.processed += 1;
        let outcome = self.process(&context).await?;
        if self.processed >= self.expected_total {
            self.flush_all().await?;
        }
        Ok(outcome)
    }

    async fn process(&mut self, context: &BatchWorkflowContext) -> Result<bool, PublishError> {
        if self.enclave.status() != EnclaveStatus::Started {
            tracing::debug!(
                "Enclave not started; skipping transaction {}",
                context.encrypted_transaction.hash
            );
            return Ok(false);
        }

        let recipient = &context.recipient_key;
        let payload = &context.encoded_payload;

        // The stored payload carries every recipient's box; the target node
        // should only see its own. The requesting key may instead be the
        // original sender recovering its own submissions, which gets the
        // payload whole.
        let outgoing = if payload.recipient_keys.contains(recipient) {
            if payload.recipient_keys.len() == 1 {
                payload.clone()
            } else {
                match EncodedPayloadBuilder::for_recipient(payload, recipient) {
                    Ok(builder) => builder.build(),
                    Err(_) => return Ok(false),
                }
            }
        } else if payload.sender_key == *recipient {
            payload.clone()
        } else {
            return Ok(false);
        };

        let targets: Vec<String> = self
            .network_store
            .get_active_nodes()
            .iter()
            .filter(|node| node.keys.contains(recipient))
            .map(|node| node.uri.as_str().to_string())
            .collect();

        if targets.is_empty() {
            tracing::warn!("No known node holds recipient key {}; skipping", recipient);
            return Ok(false);
        }

        for url in targets {
            let buffered = {
                let buffer = self.buffers.entry(url.clone()).or_default();
                buffer.push(outgoing.clone());
                buffer.len() as u64
            };
            self.published_count += 1;

            if buffered >= context.batch_size {
                if let Some(slot) = self.buffers.get_mut(&url) {
                    let batch = std::mem::take(slot);
                    self.publisher.publish_batch(&batch, &url).await?;
                }
            }
        }
        Ok(true)
    }

    async fn flush_all(&mut self) -> Result<(), PublishError> {
        let buffers = std::mem::take(&mut self.buffers);
        for (url, batch) in buffers {
            if !batch.is_empty() {
                self.publisher.publish_batch(&batch, &url).await?;
            }
        }
        Ok(())
    }

    /// Messages accumulated/published across the life of this instance.
    pub fn published_message_count(&self) -> u64 {
        self.published_count
    }
}

/// Builds one workflow per resend-batch call.
pub struct BatchWorkflowFactory {
    enclave: Arc<dyn Enclave>,
    network_store: Arc<NetworkStore>,
    publisher: Arc<dyn ResendBatchPublisher>,
}

impl BatchWorkflowFactory {
    pub fn new(
        enclave: Arc<dyn Enclave>,
        network_store: Arc<NetworkStore>,
        publisher: Arc<dyn ResendBatchPublisher>,
    ) -> Self {
        Self {
            enclave,
            network_store,
            publisher,
        }
    }

    /// `expected_total` is the number of `execute` calls the caller will
    /// make; the final partial buffers flush when it is reached.
    pub fn create(&self, expected_total: u64) -> BatchWorkflow {
        BatchWorkflow {
            enclave: self.enclave.clone(),
            network_store: self.network_store.clone(),
            publisher: self.publisher.clone(),
            expected_total,
            processed: 0,
            published_count: 0,
            buffers: HashMap::new(),
        }
    }
}
