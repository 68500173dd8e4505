//! Keeps this node's registry entry in step with the enclave's key set.

use crate::enclave::Enclave;
use crate::network::store::NetworkStore;
use crate::types::{ActiveNode, NodeUri};
use std::sync::Arc;

/// Folds local enclave key changes back into the [`NetworkStore`] so that
/// outbound discovery snapshots stay accurate. Driven on a fixed interval.
pub struct EnclaveKeySynchroniser {
    enclave: Arc<dyn Enclave>,
    store: Arc<NetworkStore>,
    own_uri: NodeUri,
}

impl EnclaveKeySynchroniser {
    pub fn new(enclave: Arc<dyn Enclave>, store: Arc<NetworkStore>, own_uri: NodeUri) -> Self {
        Self {
            enclave,
            store,
            own_uri,
        }
    }

    /// Compare the enclave's current keys with the stored own entry and
    /// overwrite the entry if they differ. Overwrite, not merge: this is the
    /// one path allowed to shrink a key set, because it reflects local key
    /// removal. Idempotent when nothing changed; no-op when this node has no
    /// entry yet.
    pub fn sync_keys(&self) {
        let Some(own_node) = self
            .store
            .get_active_nodes()
            .into_iter()
            .find(|node| node.uri == self.own_uri)
        else {
            return;
        };

        let enclave_keys = self.enclave.public_keys();
        if own_node.keys == enclave_keys {
            return;
        }

        tracing::info!(
            "Enclave key set changed ({} -> {} key(s)); updating own node entry",
            own_node.keys.len(),
            enclave_keys.len()
        );
        self.store.replace(ActiveNode::new(
            self.own_uri.clone(),
            enclave_keys,
            own_node.supported_versions,
        ));
    }
}
