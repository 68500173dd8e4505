//! Single-message resend protocol kept for peers that predate batching.

use crate::enclave::Enclave;
use crate::error::ResendError;
use crate::network::publish::PayloadPublisher;
use crate::payload::{EncodedPayload, EncodedPayloadBuilder, PayloadCodec, PrivacyMode};
use crate::storage::TransactionStore;
use crate::types::{PublicKey, ResendRequest, ResendResponse, ResendType};
use std::sync::Arc;

/// Serves `INDIVIDUAL` and `ALL` resend requests. Only standard-private
/// payloads travel this path; the protocol has no frame for privacy-group
/// metadata.
pub struct LegacyResendManager {
    enclave: Arc<dyn Enclave>,
    transaction_store: Arc<dyn TransactionStore>,
    codec: Arc<dyn PayloadCodec>,
    payload_publisher: Arc<dyn PayloadPublisher>,
    resend_fetch_size: u64,
}

impl LegacyResendManager {
    pub fn new(
        enclave: Arc<dyn Enclave>,
        transaction_store: Arc<dyn TransactionStore>,
        codec: Arc<dyn PayloadCodec>,
        payload_publisher: Arc<dyn PayloadPublisher>,
        resend_fetch_size: u64,
    ) -> Self {
        Self {
            enclave,
            transaction_store,
            codec,
            payload_publisher,
            resend_fetch_size: resend_fetch_size.max(1),
        }
    }

    pub async fn resend(&self, request: ResendRequest) -> Result<ResendResponse, ResendError> {
        match request.request_type {
            ResendType::Individual => self.resend_individual(&request).await,
            ResendType::All => self.resend_all(&request.recipient).await,
        }
    }

    /// Return one transaction, projected for the requesting key, in the
    /// response body. Nothing is pushed.
    async fn resend_individual(
        &self,
        request: &ResendRequest,
    ) -> Result<ResendResponse, ResendError> {
        let hash = request.hash.clone().ok_or(ResendError::MissingHash)?;

        let transaction = self
            .transaction_store
            .retrieve_by_hash(&hash)
            .await?
            .ok_or_else(|| ResendError::TransactionNotFound(hash.clone()))?;

        let payload = self.codec.decode(&transaction.payload)?;
        if payload.privacy_mode != PrivacyMode::StandardPrivate {
            return Err(ResendError::EnhancedPrivacyNotSupported);
        }

        let outgoing = if payload.sender_key == request.recipient {
            // The requester is the original sender recovering its own
            // submission. Prove we were a recipient before handing it back.
            let recipient_key = self
                .search_recipient_key(&payload)
                .ok_or_else(|| ResendError::RecipientKeyNotFound(hash.clone()))?;
            EncodedPayloadBuilder::from(&payload)
                .with_recipient_key(recipient_key)
                .build()
        } else {
            EncodedPayloadBuilder::for_recipient(&payload, &request.recipient)?.build()
        };

        Ok(ResendResponse {
            payload: Some(outgoing),
        })
    }

    /// Walk the whole store and push every transaction that concerns the
    /// requesting key back to it. Individual failures are logged and skipped
    /// so one bad record never aborts the sweep.
    async fn resend_all(&self, recipient: &PublicKey) -> Result<ResendResponse, ResendError> {
        let total = self.transaction_store.transaction_count().await?;
        let mut offset = 0;

        while offset < total {
            let transactions = self
                .transaction_store
                .retrieve_transactions(offset, self.resend_fetch_size)
                .await?;
            if transactions.is_empty() {
                break;
            }
            offset += transactions.len() as u64;

            for transaction in transactions {
                let payload = match self.codec.decode(&transaction.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(
                            "Skipping undecodable transaction {}: {}",
                            transaction.hash,
                            e
                        );
                        continue;
                    }
                };

                if let Err(e) = self.resend_transaction(&payload, recipient).await {
                    tracing::warn!(
                        "Failed to resend transaction {} to {}: {}",
                        transaction.hash,
                        recipient,
                        e
                    );
                }
            }
        }

        Ok(ResendResponse::default())
    }

    async fn resend_transaction(
        &self,
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) -> Result<(), ResendError> {
        if payload.privacy_mode != PrivacyMode::StandardPrivate {
            return Ok(());
        }

        let outgoing = if payload.recipient_keys.contains(recipient) {
            EncodedPayloadBuilder::for_recipient(payload, recipient)?.build()
        } else if payload.sender_key == *recipient {
            let Some(recipient_key) = self.search_recipient_key(payload) else {
                return Ok(());
            };
            EncodedPayloadBuilder::from(payload)
                .with_recipient_key(recipient_key)
                .build()
        } else {
            return Ok(());
        };

        self.payload_publisher
            .publish_payload(&outgoing, recipient)
            .await?;
        Ok(())
    }

    /// Find which of our own keys can open the payload. Stored sender
    /// payloads may carry boxes without the key list, so decryption is the
    /// only proof of membership.
    fn search_recipient_key(&self, payload: &EncodedPayload) -> Option<PublicKey> {
        self.enclave
            .public_keys()
            .into_iter()
            .find(|key| self.enclave.unencrypt_transaction(payload, key).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::SoftwareEnclave;
    use crate::error::PublishError;
    use crate::payload::BincodeCodec;
    use crate::storage::{EncryptedTransaction, InMemoryTransactionStore};
    use crate::types::MessageHash;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPayloadPublisher {
        published: Mutex<Vec<(EncodedPayload, PublicKey)>>,
    }

    #[async_trait::async_trait]
    impl PayloadPublisher for RecordingPayloadPublisher {
        async fn publish_payload(
            &self,
            payload: &EncodedPayload,
            recipient: &PublicKey,
        ) -> Result<(), PublishError> {
            self.published
                .lock()
                .push((payload.clone(), recipient.clone()));
            Ok(())
        }
    }

    struct Fixture {
        manager: LegacyResendManager,
        store: Arc<InMemoryTransactionStore>,
        publisher: Arc<RecordingPayloadPublisher>,
        own_enclave: Arc<SoftwareEnclave>,
    }

    fn fixture() -> Fixture {
        let own_enclave = Arc::new(SoftwareEnclave::generate(1));
        let store = Arc::new(InMemoryTransactionStore::new());
        let publisher = Arc::new(RecordingPayloadPublisher::default());
        let manager = LegacyResendManager::new(
            own_enclave.clone(),
            store.clone(),
            Arc::new(BincodeCodec),
            publisher.clone(),
            10,
        );
        Fixture {
            manager,
            store,
            publisher,
            own_enclave,
        }
    }

    async fn store_payload(
        store: &InMemoryTransactionStore,
        payload: &EncodedPayload,
    ) -> MessageHash {
        let raw = BincodeCodec.encode(payload).unwrap();
        let hash = MessageHash::digest(&payload.cipher_text);
        store
            .save(EncryptedTransaction::new(hash.clone(), raw))
            .await
            .unwrap();
        hash
    }

    fn individual(hash: MessageHash, recipient: PublicKey) -> ResendRequest {
        ResendRequest {
            request_type: ResendType::Individual,
            hash: Some(hash),
            recipient,
        }
    }

    #[tokio::test]
    async fn individual_resend_projects_for_the_recipient() {
        let f = fixture();
        let sender_enclave = SoftwareEnclave::generate(1);
        let sender = sender_enclave.public_keys().into_iter().next().unwrap();
        let recipient = f.own_enclave.public_keys().into_iter().next().unwrap();
        let other = PublicKey::from_bytes([7u8; 32]);

        let payload = sender_enclave
            .encrypt_payload(b"tx", &sender, &[recipient.clone(), other])
            .unwrap();
        let hash = store_payload(&f.store, &payload).await;

        let response = f
            .manager
            .resend(individual(hash, recipient.clone()))
            .await
            .unwrap();

        let returned = response.payload.unwrap();
        assert_eq!(returned.recipient_keys, vec![recipient]);
        assert_eq!(returned.recipient_boxes.len(), 1);
        assert_eq!(returned.cipher_text, payload.cipher_text);
    }

    #[tokio::test]
    async fn individual_resend_unknown_hash_names_the_hash() {
        let f = fixture();
        let hash = MessageHash::digest(b"never stored");
        let recipient = PublicKey::from_bytes([1u8; 32]);

        let err = f
            .manager
            .resend(individual(hash.clone(), recipient))
            .await
            .unwrap_err();

        match &err {
            ResendError::TransactionNotFound(h) => assert_eq!(h, &hash),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(&hash.to_string()));
    }

    #[tokio::test]
    async fn individual_resend_requires_a_hash() {
        let f = fixture();
        let err = f
            .manager
            .resend(ResendRequest {
                request_type: ResendType::Individual,
                hash: None,
                recipient: PublicKey::from_bytes([1u8; 32]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResendError::MissingHash));
    }

    #[tokio::test]
    async fn enhanced_privacy_payloads_are_refused() {
        let f = fixture();
        let recipient = f.own_enclave.public_keys().into_iter().next().unwrap();
        let sender_enclave = SoftwareEnclave::generate(1);
        let sender = sender_enclave.public_keys().into_iter().next().unwrap();

        let payload = sender_enclave
            .encrypt_payload(b"tx", &sender, &[recipient.clone()])
            .unwrap();
        let payload = EncodedPayloadBuilder::from(&payload)
            .with_privacy_mode(PrivacyMode::PartyProtection)
            .build();
        let hash = store_payload(&f.store, &payload).await;

        let err = f
            .manager
            .resend(individual(hash, recipient))
            .await
            .unwrap_err();
        assert!(matches!(err, ResendError::EnhancedPrivacyNotSupported));
    }

    #[tokio::test]
    async fn sender_recovery_annotates_a_provable_recipient_key() {
        let f = fixture();
        let own_key = f.own_enclave.public_keys().into_iter().next().unwrap();
        let sender_enclave = SoftwareEnclave::generate(1);
        let sender = sender_enclave.public_keys().into_iter().next().unwrap();

        // stored on this node as a recipient, requested back by its sender
        let payload = sender_enclave
            .encrypt_payload(b"tx", &sender, &[own_key.clone()])
            .unwrap();
        let hash = store_payload(&f.store, &payload).await;

        let response = f
            .manager
            .resend(individual(hash, sender))
            .await
            .unwrap();

        let returned = response.payload.unwrap();
        assert!(returned.recipient_keys.contains(&own_key));
        assert_eq!(returned.cipher_text, payload.cipher_text);
    }

    #[tokio::test]
    async fn sender_recovery_without_a_decrypting_key_is_an_error() {
        let f = fixture();
        let sender_enclave = SoftwareEnclave::generate(1);
        let stranger_enclave = SoftwareEnclave::generate(1);
        let sender = sender_enclave.public_keys().into_iter().next().unwrap();
        let stranger = stranger_enclave.public_keys().into_iter().next().unwrap();

        // none of this node's keys can open the payload
        let payload = sender_enclave
            .encrypt_payload(b"tx", &sender, &[stranger])
            .unwrap();
        let hash = store_payload(&f.store, &payload).await;

        let err = f
            .manager
            .resend(individual(hash.clone(), sender))
            .await
            .unwrap_err();
        match err {
            ResendError::RecipientKeyNotFound(h) => assert_eq!(h, hash),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn resend_all_pushes_only_relevant_transactions() {
        let f = fixture();
        let own_key = f.own_enclave.public_keys().into_iter().next().unwrap();
        let sender_enclave = SoftwareEnclave::generate(1);
        let sender = sender_enclave.public_keys().into_iter().next().unwrap();
        let peer = PublicKey::from_bytes([9u8; 32]);

        let relevant = sender_enclave
            .encrypt_payload(b"for peer", &sender, &[peer.clone(), own_key.clone()])
            .unwrap();
        let irrelevant = sender_enclave
            .encrypt_payload(b"for us only", &sender, &[own_key])
            .unwrap();
        store_payload(&f.store, &relevant).await;
        store_payload(&f.store, &irrelevant).await;

        let response = f
            .manager
            .resend(ResendRequest {
                request_type: ResendType::All,
                hash: None,
                recipient: peer.clone(),
            })
            .await
            .unwrap();

        assert!(response.payload.is_none());
        let published = f.publisher.published.lock();
        assert_eq!(published.len(), 1);
        let (payload, target) = &published[0];
        assert_eq!(*target, peer);
        assert_eq!(payload.recipient_keys, vec![peer]);
        assert_eq!(payload.cipher_text, relevant.cipher_text);
    }

    #[tokio::test]
    async fn resend_all_skips_enhanced_privacy_without_failing() {
        let f = fixture();
        let sender_enclave = SoftwareEnclave::generate(1);
        let sender = sender_enclave.public_keys().into_iter().next().unwrap();
        let peer = PublicKey::from_bytes([9u8; 32]);

        let payload = sender_enclave
            .encrypt_payload(b"grouped", &sender, &[peer.clone()])
            .unwrap();
        let payload = EncodedPayloadBuilder::from(&payload)
            .with_privacy_mode(PrivacyMode::PrivateStateValidation)
            .build();
        store_payload(&f.store, &payload).await;

        f.manager
            .resend(ResendRequest {
                request_type: ResendType::All,
                hash: None,
                recipient: peer,
            })
            .await
            .unwrap();

        assert!(f.publisher.published.lock().is_empty());
    }
}
