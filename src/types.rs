//! Core identity and wire types for the relay network.
//!
//! Everything a node knows about its peers flows through these types: a
//! normalized [`NodeUri`] is the sole identity of a peer, [`NodeInfo`] is the
//! wire-level announcement exchanged between nodes, and [`ActiveNode`] is the
//! in-memory view held by the network store.

use crate::error::NodeUriError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// A public key as advertised on the wire. Rendered as base64 everywhere a
/// human might see it (logs, JSON, error messages).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        BASE64.decode(encoded).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn encode(&self) -> String {
        BASE64.encode(&self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.encode())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(D::Error::custom)
    }
}

/// Digest identifying one encrypted transaction. Displays as base64, the
/// same rendering callers see in not-found error messages.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MessageHash(Vec<u8>);

impl MessageHash {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Digest of a payload's cipher text, the canonical transaction identity.
    pub fn digest(cipher_text: &[u8]) -> Self {
        Self(Sha256::digest(cipher_text).to_vec())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        BASE64.decode(encoded).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(&self.0))
    }
}

impl fmt::Debug for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHash({})", BASE64.encode(&self.0))
    }
}

impl Serialize for MessageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for MessageHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(D::Error::custom)
    }
}

/// A normalized peer address, the sole identity key for a peer.
///
/// Normalization appends exactly one trailing slash, so two addresses that
/// differ only by trailing slash compare equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeUri(String);

impl NodeUri {
    pub fn parse(raw: &str) -> Result<Self, NodeUriError> {
        let parsed = url::Url::parse(raw.trim()).map_err(|e| NodeUriError {
            uri: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !parsed.has_host() {
            return Err(NodeUriError {
                uri: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let mut normalized = parsed.to_string();
        while normalized.ends_with('/') {
            normalized.pop();
        }
        normalized.push('/');
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeUri({})", self.0)
    }
}

/// A (public key, advertising URL) pair within a node announcement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub key: PublicKey,
    pub url: String,
}

impl Recipient {
    pub fn new(key: PublicKey, url: impl Into<String>) -> Self {
        Self {
            key,
            url: url.into(),
        }
    }
}

/// Wire-level snapshot describing one node (or this node) to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub url: String,
    #[serde(default)]
    pub recipients: HashSet<Recipient>,
    #[serde(default)]
    pub supported_api_versions: HashSet<String>,
}

impl NodeInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            recipients: HashSet::new(),
            supported_api_versions: HashSet::new(),
        }
    }

    pub fn with_recipients(mut self, recipients: impl IntoIterator<Item = Recipient>) -> Self {
        self.recipients = recipients.into_iter().collect();
        self
    }

    pub fn with_supported_api_versions(
        mut self,
        versions: impl IntoIterator<Item = String>,
    ) -> Self {
        self.supported_api_versions = versions.into_iter().collect();
        self
    }
}

/// Everything currently known about one peer: its normalized address, the
/// keys it has vouched for, and the protocol versions it speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNode {
    pub uri: NodeUri,
    pub keys: HashSet<PublicKey>,
    pub supported_versions: HashSet<String>,
}

impl ActiveNode {
    pub fn new(
        uri: NodeUri,
        keys: impl IntoIterator<Item = PublicKey>,
        supported_versions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            uri,
            keys: keys.into_iter().collect(),
            supported_versions: supported_versions.into_iter().collect(),
        }
    }

    /// Union-merge of two views of the same node. Key and version sets only
    /// grow here; the uri of `self` wins (both sides compare equal anyway).
    pub fn merge(mut self, other: ActiveNode) -> ActiveNode {
        self.keys.extend(other.keys);
        self.supported_versions.extend(other.supported_versions);
        self
    }
}

/// A peer address without key data, as queued for resynchronization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Party {
    pub url: String,
}

impl Party {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A [`Party`] plus its consecutive-failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncableParty {
    pub party: Party,
    pub attempts: u32,
}

/// Whether a resend request targets one transaction or the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResendType {
    Individual,
    All,
}

/// Request for the legacy resend protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    #[serde(rename = "type")]
    pub request_type: ResendType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hash: Option<MessageHash>,
    pub recipient: PublicKey,
}

/// Response for the legacy resend protocol. `All` requests return an empty
/// payload; the effect is the per-transaction side-channel publish.
#[derive(Debug, Clone, Default)]
pub struct ResendResponse {
    pub payload: Option<crate::payload::EncodedPayload>,
}

/// Request for a batched resend of the whole store towards one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendBatchRequest {
    pub public_key: PublicKey,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub batch_size: Option<u64>,
}

/// Count of messages actually published, not necessarily equal to the
/// number of stored transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendBatchResponse {
    pub total: u64,
}

/// A batch of raw encoded payloads pushed by a resending node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatchRequest {
    pub encoded_payloads: Vec<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_uri_trailing_slash_insensitive() {
        let a = NodeUri::parse("http://node.example.com:8080").unwrap();
        let b = NodeUri::parse("http://node.example.com:8080/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http://node.example.com:8080/");
    }

    #[test]
    fn node_uri_rejects_garbage() {
        assert!(NodeUri::parse("not a uri").is_err());
        assert!(NodeUri::parse("").is_err());
    }

    #[test]
    fn active_node_merge_unions_keys_and_versions() {
        let uri = NodeUri::parse("http://peer/").unwrap();
        let k1 = PublicKey::from_bytes([1u8; 32]);
        let k2 = PublicKey::from_bytes([2u8; 32]);

        let a = ActiveNode::new(uri.clone(), [k1.clone()], ["v1".to_string()]);
        let b = ActiveNode::new(uri, [k2.clone()], ["v2".to_string()]);

        let merged = a.merge(b);
        assert!(merged.keys.contains(&k1));
        assert!(merged.keys.contains(&k2));
        assert_eq!(merged.supported_versions.len(), 2);
    }

    #[test]
    fn node_info_wire_shape_is_camel_case() {
        let key = PublicKey::from_bytes([7u8; 32]);
        let info = NodeInfo::new("http://b/")
            .with_recipients([Recipient::new(key, "http://b/")])
            .with_supported_api_versions(["v1".to_string()]);

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("supportedApiVersions").is_some());
        let recipients = json.get("recipients").unwrap().as_array().unwrap();
        assert!(recipients[0].get("key").unwrap().is_string());
    }

    #[test]
    fn message_hash_displays_as_base64() {
        let hash = MessageHash::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(hash.to_string(), "3q2+7w==");
    }

    #[test]
    fn resend_request_type_is_screaming_on_the_wire() {
        let req = ResendRequest {
            request_type: ResendType::All,
            hash: None,
            recipient: PublicKey::from_bytes([9u8; 32]),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json.get("type").unwrap(), "ALL");
        assert!(json.get("hash").is_none());
    }
}
