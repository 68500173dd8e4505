//! In-memory registry of known peers.

use crate::types::{ActiveNode, NodeUri};
use dashmap::DashMap;

/// Authoritative in-memory view of which peers exist and which keys they own.
///
/// Keyed by normalized [`NodeUri`], so the registry can never hold two
/// entries for the same peer. Safe for concurrent access from the scheduler
/// thread, worker tasks, and inbound announcement handlers.
#[derive(Default)]
pub struct NetworkStore {
    nodes: DashMap<NodeUri, ActiveNode>,
}

impl NetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge-store a node. An existing entry for the same uri is replaced by
    /// the union of the old and new key/version sets, so a partial
    /// announcement never loses previously-known keys.
    pub fn store(&self, node: ActiveNode) {
        tracing::debug!("Storing node {} with {} key(s)", node.uri, node.keys.len());
        match self.nodes.entry(node.uri.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                let merged = existing.get().clone().merge(node);
                existing.insert(merged);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(node);
            }
        }
    }

    /// Overwrite a node entry, discarding any previously-known keys. This is
    /// the one path that can shrink a key set; only the enclave key
    /// synchroniser uses it, to reflect local key removal.
    pub fn replace(&self, node: ActiveNode) {
        tracing::debug!(
            "Replacing node {} with authoritative key set ({} key(s))",
            node.uri,
            node.keys.len()
        );
        self.nodes.insert(node.uri.clone(), node);
    }

    /// Drop the entry for `uri` if present.
    pub fn remove(&self, uri: &NodeUri) {
        if self.nodes.remove(uri).is_some() {
            tracing::debug!("Removed node {}", uri);
        }
    }

    /// Point-in-time snapshot of all known nodes, usable while concurrent
    /// stores and removes occur.
    pub fn get_active_nodes(&self) -> Vec<ActiveNode> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }
}
