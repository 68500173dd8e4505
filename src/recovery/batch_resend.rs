//! Bulk push path: paginate the local store and feed every transaction
//! through one batch workflow.

use crate::error::ResendError;
use crate::payload::PayloadCodec;
use crate::recovery::batch_workflow::{BatchWorkflowContext, BatchWorkflowFactory};
use crate::storage::{EncryptedTransaction, TransactionStore};
use crate::types::{MessageHash, PushBatchRequest, ResendBatchRequest, ResendBatchResponse};
use std::sync::Arc;

/// Pages needed to walk `total` records `max_results` at a time.
pub fn calculate_batch_count(max_results: u64, total: u64) -> u64 {
    debug_assert!(max_results > 0);
    total.div_ceil(max_results)
}

/// Serves batched resend requests from peers and stages batches pushed back
/// at us. A call is a long-running, page-by-page synchronous walk of the
/// whole store; its workflow accumulator is driven strictly sequentially.
pub struct BatchResendManager {
    transaction_store: Arc<dyn TransactionStore>,
    staging_store: Arc<dyn TransactionStore>,
    codec: Arc<dyn PayloadCodec>,
    workflow_factory: BatchWorkflowFactory,
    max_batch_size: u64,
}

impl BatchResendManager {
    pub fn new(
        transaction_store: Arc<dyn TransactionStore>,
        staging_store: Arc<dyn TransactionStore>,
        codec: Arc<dyn PayloadCodec>,
        workflow_factory: BatchWorkflowFactory,
        max_batch_size: u64,
    ) -> Self {
        Self {
            transaction_store,
            staging_store,
            codec,
            workflow_factory,
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Walk the entire store and offer every transaction to the workflow
    /// for the requesting key. The response total counts messages actually
    /// published, which is independent of the transaction count.
    pub async fn resend_batch(
        &self,
        request: ResendBatchRequest,
    ) -> Result<ResendBatchResponse, ResendError> {
        let total = self.transaction_store.transaction_count().await?;

        // a peer may ask for smaller pages than our cap, never larger
        let batch_size = request
            .batch_size
            .unwrap_or(self.max_batch_size)
            .clamp(1, self.max_batch_size);
        let batch_count = calculate_batch_count(batch_size, total);

        tracing::info!(
            "Batch resend towards {}: {} transaction(s) in {} page(s) of {}",
            request.public_key,
            total,
            batch_count,
            batch_size
        );

        let mut workflow = self.workflow_factory.create(total);
        for page in 0..batch_count {
            let transactions = self
                .transaction_store
                .retrieve_transactions(page * batch_size, batch_size)
                .await?;

            for transaction in transactions {
                let payload = self.codec.decode(&transaction.payload)?;
                let context = BatchWorkflowContext {
                    recipient_key: request.public_key.clone(),
                    encrypted_transaction: transaction,
                    encoded_payload: payload,
                    batch_size,
                };
                workflow.execute(context).await?;
            }
        }

        Ok(ResendBatchResponse {
            total: workflow.published_message_count(),
        })
    }

    /// Fold records staged by an earlier recovery run back into the main
    /// store. Both stores key by content hash, so repeating a promotion is
    /// an idempotent upsert.
    pub async fn promote_staged(&self) -> Result<u64, ResendError> {
        let staged = self.staging_store.transaction_count().await?;
        let mut promoted = 0u64;
        for page in 0..calculate_batch_count(self.max_batch_size, staged) {
            let transactions = self
                .staging_store
                .retrieve_transactions(page * self.max_batch_size, self.max_batch_size)
                .await?;
            for transaction in transactions {
                self.transaction_store.save(transaction).await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Receiving side of a batch push: decode each raw payload and
    /// update-or-insert it into the staging store by content hash.
    pub async fn store_resend_batch(&self, request: PushBatchRequest) -> Result<(), ResendError> {
        for raw in request.encoded_payloads {
            let payload = self.codec.decode(&raw)?;
            let hash = MessageHash::digest(&payload.cipher_text);

            match self.staging_store.retrieve_by_hash(&hash).await? {
                Some(mut existing) => {
                    existing.payload = raw;
                    self.staging_store.update(existing).await?;
                }
                None => {
                    self.staging_store
                        .save(EncryptedTransaction::new(hash, raw))
                        .await?;
                }
            }
        }
        Ok(())
    }
}
