//! Encrypted payload model and the binary codec used on disk and on the wire.
//!
//! An [`EncodedPayload`] carries the symmetric-encrypted transaction body
//! (`cipher_text`) plus one sealed master-key box per recipient. Recipient
//! keys and boxes are parallel lists: `recipient_boxes[i]` is openable by the
//! holder of `recipient_keys[i]`. A payload stored by the original sender may
//! carry boxes without the matching key list populated.

use crate::error::PayloadError;
use crate::types::PublicKey;
use serde::{Deserialize, Serialize};

/// Privacy mode of a transaction. Only `StandardPrivate` can travel over the
/// legacy resend protocol; the other modes carry privacy-group metadata that
/// protocol has no frame for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivacyMode {
    StandardPrivate,
    PartyProtection,
    PrivateStateValidation,
}

/// One recipient's sealed copy of the payload master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientBox(pub Vec<u8>);

impl RecipientBox {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// An encrypted transaction payload as stored and exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub sender_key: PublicKey,
    pub cipher_text: Vec<u8>,
    pub nonce: Vec<u8>,
    pub recipient_keys: Vec<PublicKey>,
    pub recipient_boxes: Vec<RecipientBox>,
    pub privacy_mode: PrivacyMode,
}

impl EncodedPayload {
    pub fn builder(sender_key: PublicKey) -> EncodedPayloadBuilder {
        EncodedPayloadBuilder {
            sender_key,
            cipher_text: Vec::new(),
            nonce: Vec::new(),
            recipient_keys: Vec::new(),
            recipient_boxes: Vec::new(),
            privacy_mode: PrivacyMode::StandardPrivate,
        }
    }
}

/// Builder for [`EncodedPayload`] projections.
#[derive(Debug, Clone)]
pub struct EncodedPayloadBuilder {
    sender_key: PublicKey,
    cipher_text: Vec<u8>,
    nonce: Vec<u8>,
    recipient_keys: Vec<PublicKey>,
    recipient_boxes: Vec<RecipientBox>,
    privacy_mode: PrivacyMode,
}

impl EncodedPayloadBuilder {
    /// Start from an existing payload, keeping every field.
    pub fn from(payload: &EncodedPayload) -> Self {
        Self {
            sender_key: payload.sender_key.clone(),
            cipher_text: payload.cipher_text.clone(),
            nonce: payload.nonce.clone(),
            recipient_keys: payload.recipient_keys.clone(),
            recipient_boxes: payload.recipient_boxes.clone(),
            privacy_mode: payload.privacy_mode,
        }
    }

    /// Project a payload down to what a single recipient should see: only
    /// that recipient's key and box survive.
    pub fn for_recipient(
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) -> Result<Self, PayloadError> {
        let index = payload
            .recipient_keys
            .iter()
            .position(|k| k == recipient)
            .ok_or_else(|| PayloadError::NotARecipient(recipient.encode()))?;

        let mut builder = Self::from(payload);
        builder.recipient_keys = vec![recipient.clone()];
        builder.recipient_boxes = vec![payload.recipient_boxes[index].clone()];
        Ok(builder)
    }

    pub fn with_cipher_text(mut self, cipher_text: Vec<u8>) -> Self {
        self.cipher_text = cipher_text;
        self
    }

    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_privacy_mode(mut self, mode: PrivacyMode) -> Self {
        self.privacy_mode = mode;
        self
    }

    /// Replace the recipient key list wholesale.
    pub fn with_recipient_keys(mut self, keys: Vec<PublicKey>) -> Self {
        self.recipient_keys = keys;
        self
    }

    /// Replace the recipient box list wholesale.
    pub fn with_recipient_boxes(mut self, boxes: Vec<RecipientBox>) -> Self {
        self.recipient_boxes = boxes;
        self
    }

    /// Append one recipient key.
    pub fn with_recipient_key(mut self, key: PublicKey) -> Self {
        self.recipient_keys.push(key);
        self
    }

    /// Append one recipient box.
    pub fn with_recipient_box(mut self, recipient_box: RecipientBox) -> Self {
        self.recipient_boxes.push(recipient_box);
        self
    }

    pub fn build(self) -> EncodedPayload {
        EncodedPayload {
            sender_key: self.sender_key,
            cipher_text: self.cipher_text,
            nonce: self.nonce,
            recipient_keys: self.recipient_keys,
            recipient_boxes: self.recipient_boxes,
            privacy_mode: self.privacy_mode,
        }
    }
}

/// Binary codec seam between payload values and stored/pushed bytes.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &EncodedPayload) -> Result<Vec<u8>, PayloadError>;
    fn decode(&self, data: &[u8]) -> Result<EncodedPayload, PayloadError>;
}

/// The production codec: bincode over the serde model.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl PayloadCodec for BincodeCodec {
    fn encode(&self, payload: &EncodedPayload) -> Result<Vec<u8>, PayloadError> {
        bincode::serialize(payload).map_err(|e| PayloadError::Malformed(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<EncodedPayload, PayloadError> {
        bincode::deserialize(data).map_err(|e| PayloadError::Malformed(e.to_string()))
    }
}
