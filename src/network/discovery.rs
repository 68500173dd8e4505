//! Peer discovery: folding inbound announcements into the network store.
//!
//! Two variants exist. [`AutoDiscovery`] accepts announcements from anyone on
//! the network; [`DisabledAutoDiscovery`] pins the peer set to the configured
//! list for the process lifetime. Both enforce the anti-spoofing rule: a node
//! may only vouch for keys advertised under its own url, so recipients
//! claiming a different url are dropped before they ever reach the store.

use crate::context::RuntimeContext;
use crate::network::helper::DiscoveryHelper;
use crate::network::store::NetworkStore;
use crate::types::{ActiveNode, NodeInfo, NodeUri};
use std::collections::HashSet;
use std::sync::Arc;

/// Protocol logic turning inbound announcements into store updates and
/// producing this node's outbound snapshot.
pub trait Discovery: Send + Sync {
    /// Fold a peer announcement into the network view.
    fn on_update(&self, node_info: NodeInfo);

    /// A peer has gone offline; forget it.
    fn on_disconnect(&self, uri: &NodeUri);

    /// This node's current announcement.
    fn get_current(&self) -> NodeInfo;
}

/// Select the discovery implementation at startup from configuration.
pub fn create(
    ctx: &RuntimeContext,
    store: Arc<NetworkStore>,
    helper: Arc<DiscoveryHelper>,
) -> Arc<dyn Discovery> {
    if ctx.is_disable_peer_discovery() {
        tracing::info!(
            "Peer discovery disabled; fixed peer set of {} node(s)",
            ctx.peers().len()
        );
        Arc::new(DisabledAutoDiscovery::new(
            store,
            helper,
            ctx.peers().iter().cloned().collect(),
        ))
    } else {
        Arc::new(AutoDiscovery::new(store, helper))
    }
}

/// Keep only the recipients an announcing node is allowed to vouch for: the
/// ones advertised under its own url. Anything else is a spoofing attempt.
fn filter_own_recipients(node_info: &NodeInfo, announcer: &NodeUri) -> ActiveNode {
    let keys = node_info
        .recipients
        .iter()
        .filter(|recipient| match NodeUri::parse(&recipient.url) {
            Ok(uri) => uri == *announcer,
            Err(_) => false,
        })
        .map(|recipient| recipient.key.clone())
        .collect::<HashSet<_>>();

    let dropped = node_info.recipients.len() - keys.len();
    if dropped > 0 {
        tracing::warn!(
            "Dropped {} recipient(s) from {} claiming foreign urls",
            dropped,
            announcer
        );
    }

    ActiveNode::new(
        announcer.clone(),
        keys,
        node_info.supported_api_versions.iter().cloned(),
    )
}

/// Dynamic discovery: every validly-announced peer is merged into the store.
pub struct AutoDiscovery {
    store: Arc<NetworkStore>,
    helper: Arc<DiscoveryHelper>,
}

impl AutoDiscovery {
    pub fn new(store: Arc<NetworkStore>, helper: Arc<DiscoveryHelper>) -> Self {
        Self { store, helper }
    }
}

impl Discovery for AutoDiscovery {
    fn on_update(&self, node_info: NodeInfo) {
        let announcer = match NodeUri::parse(&node_info.url) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!("Ignoring announcement with unparseable url: {}", e);
                return;
            }
        };
        self.store.store(filter_own_recipients(&node_info, &announcer));
    }

    fn on_disconnect(&self, uri: &NodeUri) {
        tracing::info!("Peer {} disconnected", uri);
        self.store.remove(uri);
    }

    fn get_current(&self) -> NodeInfo {
        self.helper.build_current()
    }
}

/// Fixed-peer discovery used when dynamic discovery is turned off. The peer
/// set is pinned at construction; announcements from unknown urls are
/// dropped, announcements from configured peers still refresh their keys.
pub struct DisabledAutoDiscovery {
    store: Arc<NetworkStore>,
    helper: Arc<DiscoveryHelper>,
    known_peers: HashSet<NodeUri>,
}

impl DisabledAutoDiscovery {
    pub fn new(
        store: Arc<NetworkStore>,
        helper: Arc<DiscoveryHelper>,
        known_peers: HashSet<NodeUri>,
    ) -> Self {
        Self {
            store,
            helper,
            known_peers,
        }
    }
}

impl Discovery for DisabledAutoDiscovery {
    fn on_update(&self, node_info: NodeInfo) {
        let announcer = match NodeUri::parse(&node_info.url) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!("Ignoring announcement with unparseable url: {}", e);
                return;
            }
        };

        if !self.known_peers.contains(&announcer) {
            tracing::warn!(
                "Discovery is disabled; rejecting announcement from unknown peer {}",
                announcer
            );
            return;
        }

        self.store.store(filter_own_recipients(&node_info, &announcer));
    }

    fn on_disconnect(&self, uri: &NodeUri) {
        self.store.remove(uri);
    }

    fn get_current(&self) -> NodeInfo {
        self.helper.build_current()
    }
}
