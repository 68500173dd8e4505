use crate::types::MessageHash;
use thiserror::Error;

/// Top-level errors for the daemon binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Key load error: {0}")]
    KeyLoad(String),

    #[error("Invalid node URI: {0}")]
    NodeUri(#[from] NodeUriError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Resend error: {0}")]
    Resend(#[from] ResendError),
}

/// A peer address that could not be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid node uri {uri}: {reason}")]
pub struct NodeUriError {
    pub uri: String,
    pub reason: String,
}

/// Failures in the discovery layer.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// No active node advertises the requested key.
    #[error("No node found with public key {0}")]
    KeyNotFound(String),
}

/// Failures surfaced by the resend/recovery API surface.
///
/// `TransactionNotFound` and `EnhancedPrivacyNotSupported` are definitive
/// failures for the caller and are never retried internally. Transient
/// network failures never appear here; they are converted into the
/// bounded-retry bookkeeping before reaching any caller.
#[derive(Error, Debug)]
pub enum ResendError {
    #[error("Message with hash {0} was not found")]
    TransactionNotFound(MessageHash),

    #[error("Cannot resend enhanced privacy transaction in legacy resend")]
    EnhancedPrivacyNotSupported,

    #[error("Individual resend requires a transaction hash")]
    MissingHash,

    /// This node was named as sender but cannot decrypt the payload with any
    /// of its own keys, so it cannot prove it is an authorized recipient.
    #[error("No recipient key found for message with hash {0}")]
    RecipientKeyNotFound(MessageHash),

    #[error("Payload decode error: {0}")]
    PayloadDecode(#[from] PayloadError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Failures in the binary payload codec and payload projections.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Malformed encoded payload: {0}")]
    Malformed(String),

    #[error("Key {0} is not a recipient of this payload")]
    NotARecipient(String),
}

/// Failures from the enclave seam.
#[derive(Error, Debug)]
pub enum EnclaveError {
    #[error("Enclave is not started")]
    NotStarted,

    #[error("Key {0} is not managed by this enclave")]
    UnknownKey(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// Failures from the transaction/staging stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open {name} tree: {source}")]
    TreeOpen {
        name: String,
        #[source]
        source: sled::Error,
    },

    #[error("Database operation failed: {0}")]
    DatabaseOp(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::DatabaseOp(e.to_string())
    }
}

/// Failures from outbound RPC calls.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Failures while publishing payloads to a remote node.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("No known node holds recipient key {0}")]
    UnknownRecipient(String),

    #[error("Remote node rejected the batch")]
    Rejected,
}
