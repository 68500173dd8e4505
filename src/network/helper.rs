//! Builders for outbound node announcements.

use crate::enclave::Enclave;
use crate::error::DiscoveryError;
use crate::network::store::NetworkStore;
use crate::network::SUPPORTED_API_VERSIONS;
use crate::types::{ActiveNode, NodeInfo, NodeUri, PublicKey, Recipient};
use std::sync::Arc;

/// Produces [`NodeInfo`] snapshots describing this node or the rest of the
/// known network, backed by the live [`NetworkStore`].
pub struct DiscoveryHelper {
    store: Arc<NetworkStore>,
    enclave: Arc<dyn Enclave>,
    own_uri: NodeUri,
}

impl DiscoveryHelper {
    pub fn new(store: Arc<NetworkStore>, enclave: Arc<dyn Enclave>, own_uri: NodeUri) -> Self {
        Self {
            store,
            enclave,
            own_uri,
        }
    }

    pub fn own_uri(&self) -> &NodeUri {
        &self.own_uri
    }

    /// Run once at startup: register this node's own URI and the enclave's
    /// current public keys.
    pub fn on_create(&self) {
        let keys = self.enclave.public_keys();
        tracing::info!(
            "Registering own node {} with {} enclave key(s)",
            self.own_uri,
            keys.len()
        );
        self.store.store(ActiveNode::new(
            self.own_uri.clone(),
            keys,
            SUPPORTED_API_VERSIONS.iter().map(|v| v.to_string()),
        ));
    }

    fn to_node_info(node: &ActiveNode) -> NodeInfo {
        let url = node.uri.as_str().to_string();
        NodeInfo::new(url.clone())
            .with_recipients(
                node.keys
                    .iter()
                    .map(|key| Recipient::new(key.clone(), url.clone())),
            )
            .with_supported_api_versions(node.supported_versions.iter().cloned())
    }

    /// Snapshot of this node as announced to peers: our url, plus every
    /// recipient known network-wide under its owning node's url. Receivers
    /// filter to what the announcer may vouch for, so the foreign entries
    /// serve only to spread urls through the network.
    pub fn build_current(&self) -> NodeInfo {
        let nodes = self.store.get_active_nodes();
        let recipients: Vec<Recipient> = nodes
            .iter()
            .flat_map(|node| {
                let url = node.uri.as_str().to_string();
                node.keys
                    .iter()
                    .map(move |key| Recipient::new(key.clone(), url.clone()))
            })
            .collect();

        let versions: Vec<String> = nodes
            .iter()
            .find(|node| node.uri == self.own_uri)
            .map(|node| node.supported_versions.iter().cloned().collect())
            .unwrap_or_else(|| SUPPORTED_API_VERSIONS.iter().map(|v| v.to_string()).collect());

        NodeInfo::new(self.own_uri.as_str())
            .with_recipients(recipients)
            .with_supported_api_versions(versions)
    }

    /// Find the node advertising `key` and expose all of that node's keys
    /// and versions.
    pub fn build_remote_node_info(&self, key: &PublicKey) -> Result<NodeInfo, DiscoveryError> {
        self.store
            .get_active_nodes()
            .iter()
            .find(|node| node.keys.contains(key))
            .map(Self::to_node_info)
            .ok_or_else(|| DiscoveryError::KeyNotFound(key.encode()))
    }

    /// One [`NodeInfo`] per known peer, excluding this node. Used to tell a
    /// newly-joined peer about the rest of the network.
    pub fn build_remote_node_infos(&self) -> Vec<NodeInfo> {
        self.store
            .get_active_nodes()
            .iter()
            .filter(|node| node.uri != self.own_uri)
            .map(Self::to_node_info)
            .collect()
    }
}
