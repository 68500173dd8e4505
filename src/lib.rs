//! Peer discovery and transaction reconciliation engine for a private
//! transaction relay node.
//!
//! The crate is organised around three long-lived concerns:
//!
//! - `network`: who is out there. The [`network::store::NetworkStore`] holds
//!   the active node map, fed by [`network::discovery`] from inbound
//!   announcements and corrected by the enclave key synchroniser.
//! - `sync`: keeping this node's view announced. The
//!   [`sync::poller::SyncPoller`] periodically pushes our node info to every
//!   known party and asks each one to resend what it holds for our keys,
//!   with bounded retries per party.
//! - `recovery`: serving those requests. [`recovery::batch_resend`] walks
//!   the local store in pages and pushes batches back;
//!   [`recovery::legacy_resend`] is the single-message protocol kept for
//!   older peers.

pub mod config;
pub mod context;
pub mod enclave;
pub mod error;
pub mod network;
pub mod payload;
pub mod recovery;
pub mod storage;
pub mod sync;
pub mod types;

pub use config::Config;
pub use context::RuntimeContext;
pub use enclave::{Enclave, EnclaveStatus, SoftwareEnclave};
pub use payload::{EncodedPayload, PayloadCodec, PrivacyMode};
pub use types::{MessageHash, NodeInfo, NodeUri, PublicKey};
