//! End-to-end reconciliation scenarios: two in-process nodes wired together
//! through stub transports, exercising discovery, the sync poller, and both
//! resend protocols without any real HTTP.

use async_trait::async_trait;
use relayd::context::RuntimeContext;
use relayd::enclave::{Enclave, SoftwareEnclave};
use relayd::error::{NetworkError, PublishError};
use relayd::network::client::P2pClient;
use relayd::network::discovery::{self, Discovery};
use relayd::network::helper::DiscoveryHelper;
use relayd::network::publish::{PayloadPublisher, ResendBatchPublisher};
use relayd::network::store::NetworkStore;
use relayd::payload::{BincodeCodec, EncodedPayload, PayloadCodec};
use relayd::recovery::batch_resend::BatchResendManager;
use relayd::recovery::batch_workflow::BatchWorkflowFactory;
use relayd::recovery::legacy_resend::LegacyResendManager;
use relayd::storage::{EncryptedTransaction, InMemoryTransactionStore, TransactionStore};
use relayd::sync::poller::SyncPoller;
use relayd::sync::resend_party_store::{ResendPartyStore, MAX_ATTEMPTS};
use relayd::sync::transaction_requester::TransactionRequester;
use relayd::types::{
    MessageHash, NodeInfo, NodeUri, PublicKey, PushBatchRequest, ResendBatchRequest, ResendRequest,
};
use std::sync::Arc;

/// One in-process node: enclave, stores, and the discovery stack.
struct Node {
    enclave: Arc<SoftwareEnclave>,
    store: Arc<InMemoryTransactionStore>,
    staging: Arc<InMemoryTransactionStore>,
    network_store: Arc<NetworkStore>,
    helper: Arc<DiscoveryHelper>,
    discovery: Arc<dyn Discovery>,
}

fn node(url: &str) -> Node {
    let ctx = RuntimeContext::new(NodeUri::parse(url).unwrap(), vec![], false);
    let enclave = Arc::new(SoftwareEnclave::generate(1));
    let network_store = Arc::new(NetworkStore::new());
    let helper = Arc::new(DiscoveryHelper::new(
        network_store.clone(),
        enclave.clone(),
        ctx.p2p_server_uri().clone(),
    ));
    helper.on_create();
    let discovery = discovery::create(&ctx, network_store.clone(), helper.clone());
    Node {
        enclave,
        store: Arc::new(InMemoryTransactionStore::new()),
        staging: Arc::new(InMemoryTransactionStore::new()),
        network_store,
        helper,
        discovery,
    }
}

fn only_key(node: &Node) -> PublicKey {
    node.enclave.public_keys().into_iter().next().unwrap()
}

async fn store_transaction_for(
    holder: &Node,
    recipient: &PublicKey,
    body: &[u8],
) -> MessageHash {
    let sender = only_key(holder);
    let payload = holder
        .enclave
        .encrypt_payload(body, &sender, &[recipient.clone()])
        .unwrap();
    let raw = BincodeCodec.encode(&payload).unwrap();
    let hash = MessageHash::digest(&payload.cipher_text);
    holder
        .store
        .save(EncryptedTransaction::new(hash.clone(), raw))
        .await
        .unwrap();
    hash
}

/// Delivers published payloads straight into the receiving node's store,
/// standing in for the push endpoint.
struct DirectPayloadDelivery {
    target_store: Arc<InMemoryTransactionStore>,
}

#[async_trait]
impl PayloadPublisher for DirectPayloadDelivery {
    async fn publish_payload(
        &self,
        payload: &EncodedPayload,
        _recipient: &PublicKey,
    ) -> Result<(), PublishError> {
        let raw = BincodeCodec.encode(payload).unwrap();
        let hash = MessageHash::digest(&payload.cipher_text);
        self.target_store
            .save(EncryptedTransaction::new(hash, raw))
            .await
            .unwrap();
        Ok(())
    }
}

/// Delivers flushed batches into the receiving node's batch manager,
/// standing in for the pushBatch endpoint.
struct DirectBatchDelivery {
    target: Arc<BatchResendManager>,
}

#[async_trait]
impl ResendBatchPublisher for DirectBatchDelivery {
    async fn publish_batch(
        &self,
        payloads: &[EncodedPayload],
        _target_url: &str,
    ) -> Result<(), PublishError> {
        let encoded_payloads = payloads
            .iter()
            .map(|p| BincodeCodec.encode(p).unwrap())
            .collect();
        self.target
            .store_resend_batch(PushBatchRequest { encoded_payloads })
            .await
            .unwrap();
        Ok(())
    }
}

/// Batch publisher for a node that never serves outbound batches in a test.
struct NoopBatchPublisher;

#[async_trait]
impl ResendBatchPublisher for NoopBatchPublisher {
    async fn publish_batch(&self, _: &[EncodedPayload], _: &str) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Transport stub routing one node's client calls into another node's
/// discovery and legacy resend manager.
struct InProcessTransport {
    remote_discovery: Arc<dyn Discovery>,
    remote_resend: Arc<LegacyResendManager>,
}

#[async_trait]
impl P2pClient for InProcessTransport {
    async fn send_party_info(&self, _url: &str, info: &NodeInfo) -> Result<bool, NetworkError> {
        self.remote_discovery.on_update(info.clone());
        Ok(true)
    }

    async fn make_resend_request(
        &self,
        _url: &str,
        request: &ResendRequest,
    ) -> Result<bool, NetworkError> {
        Ok(self.remote_resend.resend(request.clone()).await.is_ok())
    }

    async fn push_payload(&self, _: &str, _: &[u8]) -> Result<bool, NetworkError> {
        Ok(true)
    }

    async fn push_batch(&self, _: &str, _: &PushBatchRequest) -> Result<bool, NetworkError> {
        Ok(true)
    }
}

/// Transport stub where the remote node never accepts anything.
struct DeadTransport;

#[async_trait]
impl P2pClient for DeadTransport {
    async fn send_party_info(&self, _: &str, _: &NodeInfo) -> Result<bool, NetworkError> {
        Ok(false)
    }

    async fn make_resend_request(&self, _: &str, _: &ResendRequest) -> Result<bool, NetworkError> {
        Ok(false)
    }

    async fn push_payload(&self, _: &str, _: &[u8]) -> Result<bool, NetworkError> {
        Ok(false)
    }

    async fn push_batch(&self, _: &str, _: &PushBatchRequest) -> Result<bool, NetworkError> {
        Ok(false)
    }
}

#[tokio::test]
async fn sync_round_recovers_transactions_held_by_a_peer() {
    let a = node("http://node-a:8080");
    let b = node("http://node-b:8080");
    let a_key = only_key(&a);

    // B holds a transaction addressed to A
    let hash = store_transaction_for(&b, &a_key, b"private payload").await;

    // A already knows B exists, e.g. from a previous announcement
    a.discovery.on_update(b.helper.build_current());

    // B's resend path delivers straight back into A's store
    let b_resend = Arc::new(LegacyResendManager::new(
        b.enclave.clone(),
        b.store.clone(),
        Arc::new(BincodeCodec),
        Arc::new(DirectPayloadDelivery {
            target_store: a.store.clone(),
        }),
        10,
    ));
    let transport = Arc::new(InProcessTransport {
        remote_discovery: b.discovery.clone(),
        remote_resend: b_resend,
    });

    let resend_party_store = Arc::new(ResendPartyStore::new());
    let requester = Arc::new(TransactionRequester::new(
        a.enclave.clone(),
        transport.clone(),
    ));
    let poller = SyncPoller::new(
        resend_party_store.clone(),
        requester,
        a.discovery.clone(),
        transport,
    );

    for handle in poller.run().await {
        handle.await.unwrap();
    }

    // A now holds the transaction and can decrypt it
    let recovered = a.store.retrieve_by_hash(&hash).await.unwrap().unwrap();
    let payload = BincodeCodec.decode(&recovered.payload).unwrap();
    let opened = a.enclave.unencrypt_transaction(&payload, &a_key).unwrap();
    assert_eq!(opened, b"private payload");

    // B also learned about A through the announcement
    assert!(b
        .network_store
        .get_active_nodes()
        .iter()
        .any(|n| n.uri == NodeUri::parse("http://node-a:8080").unwrap()
            && n.keys.contains(&a_key)));

    // the successful party is not re-queued
    assert!(resend_party_store.get_next_party().is_none());
}

#[tokio::test]
async fn batch_resend_round_trip_fills_the_staging_store() {
    let a = node("http://node-a:8080");
    let b = node("http://node-b:8080");
    let a_key = only_key(&a);

    let mut hashes = Vec::new();
    for n in 0..7u8 {
        hashes.push(store_transaction_for(&b, &a_key, &[n; 16]).await);
    }

    // B must know which node holds A's key to target the batches
    b.discovery.on_update(a.helper.build_current());

    // A's manager only receives here; it never publishes
    let a_manager = Arc::new(BatchResendManager::new(
        a.store.clone(),
        a.staging.clone(),
        Arc::new(BincodeCodec),
        BatchWorkflowFactory::new(
            a.enclave.clone(),
            a.network_store.clone(),
            Arc::new(NoopBatchPublisher),
        ),
        100,
    ));

    let b_manager = BatchResendManager::new(
        b.store.clone(),
        b.staging.clone(),
        Arc::new(BincodeCodec),
        BatchWorkflowFactory::new(
            b.enclave.clone(),
            b.network_store.clone(),
            Arc::new(DirectBatchDelivery {
                target: a_manager.clone(),
            }),
        ),
        100,
    );

    let response = b_manager
        .resend_batch(ResendBatchRequest {
            public_key: a_key,
            batch_size: Some(3),
        })
        .await
        .unwrap();

    assert_eq!(response.total, 7);
    assert_eq!(a.staging.transaction_count().await.unwrap(), 7);
    for hash in hashes {
        assert!(a.staging.retrieve_by_hash(&hash).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn disabled_discovery_pins_the_network_view_to_configured_peers() {
    let peer_uri = NodeUri::parse("http://trusted:8080").unwrap();
    let ctx = RuntimeContext::new(
        NodeUri::parse("http://node-a:8080").unwrap(),
        vec![peer_uri.clone()],
        true,
    );
    let enclave = Arc::new(SoftwareEnclave::generate(1));
    let network_store = Arc::new(NetworkStore::new());
    let helper = Arc::new(DiscoveryHelper::new(
        network_store.clone(),
        enclave,
        ctx.p2p_server_uri().clone(),
    ));
    helper.on_create();
    let disc = discovery::create(&ctx, network_store.clone(), helper);

    let trusted = node("http://trusted:8080");
    let intruder = node("http://intruder:8080");

    disc.on_update(intruder.helper.build_current());
    disc.on_update(trusted.helper.build_current());

    let nodes = network_store.get_active_nodes();
    assert!(nodes.iter().any(|n| n.uri == peer_uri));
    assert!(!nodes
        .iter()
        .any(|n| n.uri == NodeUri::parse("http://intruder:8080").unwrap()));
}

#[tokio::test]
async fn unreachable_peer_is_retried_then_evicted() {
    let a = node("http://node-a:8080");
    let b = node("http://node-b:8080");

    a.discovery.on_update(b.helper.build_current());

    let resend_party_store = Arc::new(ResendPartyStore::new());
    let transport = Arc::new(DeadTransport);
    let requester = Arc::new(TransactionRequester::new(
        a.enclave.clone(),
        transport.clone(),
    ));
    let poller = SyncPoller::new(
        resend_party_store.clone(),
        requester,
        a.discovery.clone(),
        transport,
    );

    // every round fails and re-queues with one more attempt, until eviction
    for round in 0..MAX_ATTEMPTS {
        let handles = poller.run().await;
        assert_eq!(handles.len(), 1, "round {round} should retry the peer");
        for handle in handles {
            handle.await.unwrap();
        }
    }

    // evicted for good: the seen-set blocks re-qualification
    assert!(poller.run().await.is_empty());
}
