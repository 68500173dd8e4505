//! Key-owning enclave seam.
//!
//! The reconciliation engine only depends on the [`Enclave`] trait: which
//! public keys this node owns, whether the enclave is serving, and the
//! ability to decrypt a payload with an owned key. [`SoftwareEnclave`] is the
//! in-process implementation: per-recipient x25519 agreement sealing an
//! AES-256-GCM master key, the master key encrypting the transaction body.

use crate::error::EnclaveError;
use crate::payload::{EncodedPayload, PrivacyMode, RecipientBox};
use crate::types::PublicKey;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Lifecycle state of the enclave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnclaveStatus {
    Started,
    Stopped,
}

/// The contract the engine needs from the key-owning component.
pub trait Enclave: Send + Sync {
    fn status(&self) -> EnclaveStatus;

    /// Public keys managed by this node.
    fn public_keys(&self) -> HashSet<PublicKey>;

    /// Encrypt a message from `sender` towards `recipients`, producing a
    /// payload with one sealed box per recipient.
    fn encrypt_payload(
        &self,
        message: &[u8],
        sender: &PublicKey,
        recipients: &[PublicKey],
    ) -> Result<EncodedPayload, EnclaveError>;

    /// Decrypt a payload using one of this node's own keys. `provided_key`
    /// may be the sender key (decrypting our own submission) or a recipient
    /// key we hold.
    fn unencrypt_transaction(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError>;
}

/// In-process enclave holding x25519 static secrets.
pub struct SoftwareEnclave {
    keys: HashMap<PublicKey, StaticSecret>,
    started: AtomicBool,
}

impl SoftwareEnclave {
    /// Build from raw 32-byte secrets (e.g. loaded from config).
    pub fn from_secrets(secrets: impl IntoIterator<Item = [u8; KEY_LEN]>) -> Self {
        let keys = secrets
            .into_iter()
            .map(|bytes| {
                let secret = StaticSecret::from(bytes);
                let public = x25519_dalek::PublicKey::from(&secret);
                (PublicKey::from_bytes(public.as_bytes().to_vec()), secret)
            })
            .collect();
        Self {
            keys,
            started: AtomicBool::new(true),
        }
    }

    /// Generate `count` fresh keypairs. Used when no keys are configured.
    pub fn generate(count: usize) -> Self {
        let mut rng = rand::thread_rng();
        let secrets = (0..count.max(1)).map(|_| {
            let mut bytes = [0u8; KEY_LEN];
            rng.fill_bytes(&mut bytes);
            bytes
        });
        Self::from_secrets(secrets.collect::<Vec<_>>())
    }

    /// Take the enclave out of service. Resend workflows observe this and
    /// skip work instead of failing.
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    fn secret_for(&self, key: &PublicKey) -> Result<&StaticSecret, EnclaveError> {
        self.keys
            .get(key)
            .ok_or_else(|| EnclaveError::UnknownKey(key.encode()))
    }

    fn seal(shared: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(shared));
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| EnclaveError::Encryption(e.to_string()))?;

        // box layout: nonce || ciphertext
        let mut out = nonce.to_vec();
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn open(shared: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        if sealed.len() < NONCE_LEN {
            return Err(EnclaveError::Decryption("box too short".to_string()));
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(shared));
        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|e| EnclaveError::Decryption(e.to_string()))
    }

    fn shared_secret(secret: &StaticSecret, public: &PublicKey) -> Result<[u8; KEY_LEN], EnclaveError> {
        let bytes: [u8; KEY_LEN] = public
            .as_bytes()
            .try_into()
            .map_err(|_| EnclaveError::Decryption("malformed public key".to_string()))?;
        let their_public = x25519_dalek::PublicKey::from(bytes);
        Ok(secret.diffie_hellman(&their_public).to_bytes())
    }

    fn open_master_key(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let secret = self.secret_for(provided_key)?;

        if *provided_key == payload.sender_key {
            // Sender side: one agreement per recipient key.
            for (i, recipient) in payload.recipient_keys.iter().enumerate() {
                let Some(sealed) = payload.recipient_boxes.get(i) else {
                    break;
                };
                let shared = Self::shared_secret(secret, recipient)?;
                if let Ok(master) = Self::open(&shared, sealed.as_bytes()) {
                    return Ok(Zeroizing::new(master));
                }
            }
            return Err(EnclaveError::Decryption(
                "no recipient box opened with the sender key".to_string(),
            ));
        }

        // Recipient side: single agreement against the sender, then find the
        // box that opens. The key list may be absent, so every box is tried.
        let shared = Self::shared_secret(secret, &payload.sender_key)?;
        for sealed in &payload.recipient_boxes {
            if let Ok(master) = Self::open(&shared, sealed.as_bytes()) {
                return Ok(Zeroizing::new(master));
            }
        }
        Err(EnclaveError::Decryption(
            "no recipient box opened with the provided key".to_string(),
        ))
    }
}

impl Enclave for SoftwareEnclave {
    fn status(&self) -> EnclaveStatus {
        if self.started.load(Ordering::SeqCst) {
            EnclaveStatus::Started
        } else {
            EnclaveStatus::Stopped
        }
    }

    fn public_keys(&self) -> HashSet<PublicKey> {
        self.keys.keys().cloned().collect()
    }

    fn encrypt_payload(
        &self,
        message: &[u8],
        sender: &PublicKey,
        recipients: &[PublicKey],
    ) -> Result<EncodedPayload, EnclaveError> {
        if self.status() != EnclaveStatus::Started {
            return Err(EnclaveError::NotStarted);
        }
        let secret = self.secret_for(sender)?;

        let mut master = Zeroizing::new(vec![0u8; KEY_LEN]);
        rand::thread_rng().fill_bytes(&mut master);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&master));
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let cipher_text = cipher
            .encrypt(Nonce::from_slice(&nonce), message)
            .map_err(|e| EnclaveError::Encryption(e.to_string()))?;

        let mut boxes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let shared = Self::shared_secret(secret, recipient)?;
            boxes.push(RecipientBox(Self::seal(&shared, &master)?));
        }

        Ok(EncodedPayload::builder(sender.clone())
            .with_cipher_text(cipher_text)
            .with_nonce(nonce.to_vec())
            .with_recipient_keys(recipients.to_vec())
            .with_recipient_boxes(boxes)
            .with_privacy_mode(PrivacyMode::StandardPrivate)
            .build())
    }

    fn unencrypt_transaction(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError> {
        if self.status() != EnclaveStatus::Started {
            return Err(EnclaveError::NotStarted);
        }
        let master = self.open_master_key(payload, provided_key)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&master));
        cipher
            .decrypt(Nonce::from_slice(&payload.nonce), payload.cipher_text.as_slice())
            .map_err(|e| EnclaveError::Decryption(e.to_string()))
    }
}
