//! Process-wide runtime context, built once from configuration and handed to
//! components by constructor injection.

use crate::config::Config;
use crate::error::NodeUriError;
use crate::types::NodeUri;

/// The static facts about this node that the engine needs at runtime.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    p2p_server_uri: NodeUri,
    peers: Vec<NodeUri>,
    disable_peer_discovery: bool,
}

impl RuntimeContext {
    pub fn new(
        p2p_server_uri: NodeUri,
        peers: Vec<NodeUri>,
        disable_peer_discovery: bool,
    ) -> Self {
        Self {
            p2p_server_uri,
            peers,
            disable_peer_discovery,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, NodeUriError> {
        let p2p_server_uri = NodeUri::parse(&config.node.url)?;
        let peers = config
            .network
            .peers
            .iter()
            .map(|p| NodeUri::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            p2p_server_uri,
            peers,
            config.network.disable_peer_discovery,
        ))
    }

    pub fn p2p_server_uri(&self) -> &NodeUri {
        &self.p2p_server_uri
    }

    pub fn peers(&self) -> &[NodeUri] {
        &self.peers
    }

    pub fn is_disable_peer_discovery(&self) -> bool {
        self.disable_peer_discovery
    }
}
