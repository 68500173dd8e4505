//! Per-peer client logic requesting everything addressed to this node.

use crate::enclave::Enclave;
use crate::network::client::P2pClient;
use crate::types::{ResendRequest, ResendType};
use std::sync::Arc;

/// Asks one specific peer to resend all transactions addressed to each of
/// this node's enclave keys.
pub struct TransactionRequester {
    enclave: Arc<dyn Enclave>,
    p2p_client: Arc<dyn P2pClient>,
}

impl TransactionRequester {
    pub fn new(enclave: Arc<dyn Enclave>, p2p_client: Arc<dyn P2pClient>) -> Self {
        Self {
            enclave,
            p2p_client,
        }
    }

    /// One resend-all request per locally-owned key. True only if every
    /// request succeeds; the first failure short-circuits, the remaining
    /// keys will be retried on the party's next pass through the queue.
    pub async fn request_all_transactions_from_node(&self, url: &str) -> bool {
        for key in self.enclave.public_keys() {
            let request = ResendRequest {
                request_type: ResendType::All,
                hash: None,
                recipient: key.clone(),
            };

            match self.p2p_client.make_resend_request(url, &request).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("Node {} declined resend request for key {}", url, key);
                    return false;
                }
                Err(e) => {
                    tracing::warn!("Failed to make resend request to {}: {}", url, e);
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::SoftwareEnclave;
    use crate::error::NetworkError;
    use crate::types::{NodeInfo, PushBatchRequest};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// P2P client stub with scripted resend outcomes.
    struct ScriptedClient {
        results: Mutex<Vec<Result<bool, NetworkError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(results: Vec<Result<bool, NetworkError>>) -> Self {
            Self {
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl P2pClient for ScriptedClient {
        async fn send_party_info(&self, _: &str, _: &NodeInfo) -> Result<bool, NetworkError> {
            Ok(true)
        }

        async fn make_resend_request(
            &self,
            _: &str,
            _: &ResendRequest,
        ) -> Result<bool, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock();
            if results.is_empty() {
                Ok(true)
            } else {
                results.remove(0)
            }
        }

        async fn push_payload(&self, _: &str, _: &[u8]) -> Result<bool, NetworkError> {
            Ok(true)
        }

        async fn push_batch(&self, _: &str, _: &PushBatchRequest) -> Result<bool, NetworkError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn one_request_per_enclave_key() {
        let enclave = Arc::new(SoftwareEnclave::generate(3));
        let client = Arc::new(ScriptedClient::new(vec![]));
        let requester = TransactionRequester::new(enclave, client.clone());

        assert!(requester.request_all_transactions_from_node("http://peer/").await);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn declined_request_fails_the_whole_node() {
        let enclave = Arc::new(SoftwareEnclave::generate(2));
        let client = Arc::new(ScriptedClient::new(vec![Ok(false)]));
        let requester = TransactionRequester::new(enclave, client.clone());

        assert!(!requester.request_all_transactions_from_node("http://peer/").await);
        // short-circuits after the first failure
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_error_fails_the_whole_node() {
        let enclave = Arc::new(SoftwareEnclave::generate(1));
        let client = Arc::new(ScriptedClient::new(vec![Err(NetworkError::Request {
            url: "http://peer/".to_string(),
            reason: "connection refused".to_string(),
        })]));
        let requester = TransactionRequester::new(enclave, client);

        assert!(!requester.request_all_transactions_from_node("http://peer/").await);
    }
}
