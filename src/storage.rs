//! Persistent stores for encrypted transactions.
//!
//! One trait covers both the main transaction store and the staging store
//! used on the receiving side of a batch push; they share the same contract
//! and differ only in which tree backs them. Pagination order is stable for
//! the lifetime of the process so page-by-page resend passes touch every
//! record exactly once.

use crate::error::StoreError;
use crate::types::MessageHash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A stored transaction: its content digest plus the encoded payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTransaction {
    pub hash: MessageHash,
    pub payload: Vec<u8>,
}

impl EncryptedTransaction {
    pub fn new(hash: MessageHash, payload: Vec<u8>) -> Self {
        Self { hash, payload }
    }
}

#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transaction_count(&self) -> Result<u64, StoreError>;

    /// Retrieve up to `limit` transactions starting at `offset`, in a stable
    /// order.
    async fn retrieve_transactions(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<EncryptedTransaction>, StoreError>;

    async fn retrieve_by_hash(
        &self,
        hash: &MessageHash,
    ) -> Result<Option<EncryptedTransaction>, StoreError>;

    async fn save(&self, tx: EncryptedTransaction) -> Result<(), StoreError>;

    async fn update(&self, tx: EncryptedTransaction) -> Result<(), StoreError>;
}

#[derive(Default)]
struct InMemoryInner {
    order: Vec<MessageHash>,
    by_hash: HashMap<MessageHash, EncryptedTransaction>,
}

/// Insertion-ordered in-memory store, used in tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    inner: Arc<RwLock<InMemoryInner>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn transaction_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.order.len() as u64)
    }

    async fn retrieve_transactions(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<EncryptedTransaction>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|h| inner.by_hash.get(h).cloned())
            .collect())
    }

    async fn retrieve_by_hash(
        &self,
        hash: &MessageHash,
    ) -> Result<Option<EncryptedTransaction>, StoreError> {
        Ok(self.inner.read().await.by_hash.get(hash).cloned())
    }

    async fn save(&self, tx: EncryptedTransaction) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.by_hash.contains_key(&tx.hash) {
            inner.order.push(tx.hash.clone());
        }
        inner.by_hash.insert(tx.hash.clone(), tx);
        Ok(())
    }

    async fn update(&self, tx: EncryptedTransaction) -> Result<(), StoreError> {
        self.save(tx).await
    }
}

/// Sled-backed store. Keys are the message hash bytes, values are
/// bincode-encoded [`EncryptedTransaction`] records; sled's byte ordering
/// gives the stable pagination order.
pub struct SledTransactionStore {
    tree: sled::Tree,
}

impl SledTransactionStore {
    pub fn open(db: &sled::Db, tree_name: &str) -> Result<Self, StoreError> {
        let tree = db.open_tree(tree_name).map_err(|source| StoreError::TreeOpen {
            name: tree_name.to_string(),
            source,
        })?;
        Ok(Self { tree })
    }
}

#[async_trait::async_trait]
impl TransactionStore for SledTransactionStore {
    async fn transaction_count(&self) -> Result<u64, StoreError> {
        Ok(self.tree.len() as u64)
    }

    async fn retrieve_transactions(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<EncryptedTransaction>, StoreError> {
        let mut out = Vec::new();
        for item in self.tree.iter().skip(offset as usize).take(limit as usize) {
            let (_, value) = item?;
            let tx = bincode::deserialize(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            out.push(tx);
        }
        Ok(out)
    }

    async fn retrieve_by_hash(
        &self,
        hash: &MessageHash,
    ) -> Result<Option<EncryptedTransaction>, StoreError> {
        match self.tree.get(hash.as_bytes())? {
            Some(value) => {
                let tx = bincode::deserialize(&value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, tx: EncryptedTransaction) -> Result<(), StoreError> {
        let value =
            bincode::serialize(&tx).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.tree.insert(tx.hash.as_bytes(), value)?;
        self.tree.flush_async().await?;
        Ok(())
    }

    async fn update(&self, tx: EncryptedTransaction) -> Result<(), StoreError> {
        self.save(tx).await
    }
}
