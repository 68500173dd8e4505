//! Peer network view: the node registry, discovery protocol logic, outbound
//! client seams, and the enclave key synchroniser.

pub mod client;
pub mod discovery;
pub mod helper;
pub mod key_synchroniser;
pub mod publish;
pub mod store;

/// Protocol versions this node speaks, advertised in every announcement.
pub const SUPPORTED_API_VERSIONS: &[&str] = &["v1", "v2"];
