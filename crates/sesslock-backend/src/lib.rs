//! sesslock Backend - the key-value capability set
//!
//! The lock service and the field store only ever talk to the store through
//! [`KvBackend`]. It enumerates exactly the operations they need: plain string
//! keys for locks, hash records for session fields, and an atomic batch for
//! multi-key writes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use sesslock_common::Result;

mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;

/// Remote key-value store operations
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a string key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a string key only if it does not exist; `true` when set
    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool>;

    /// Replace a string key, returning its previous value
    async fn get_set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Delete a key of any type; `true` when it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Apply a time-to-live to a key; `false` when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>>;

    async fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()>;

    /// Remove hash fields, returning how many existed
    async fn hash_delete(&self, key: &str, field: &str) -> Result<u64>;

    /// Set a hash field only if it does not exist; `true` when set
    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool>;

    /// Apply every operation of the batch as one unit
    async fn execute(&self, batch: Batch) -> Result<()>;
}

/// One queued write of a [`Batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    HashSet {
        key: String,
        field: String,
        value: Vec<u8>,
    },
    HashSetIfAbsent {
        key: String,
        field: String,
        value: Vec<u8>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

/// Writes submitted together through [`KvBackend::execute`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_set(&mut self, key: &str, field: &str, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::HashSet {
            key: key.to_string(),
            field: field.to_string(),
            value,
        });
        self
    }

    pub fn hash_set_if_absent(&mut self, key: &str, field: &str, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::HashSetIfAbsent {
            key: key.to_string(),
            field: field.to_string(),
            value,
        });
        self
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.ops.push(BatchOp::Expire {
            key: key.to_string(),
            ttl,
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_builder() {
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        batch
            .hash_set("sess:a:1", "cart", b"[]".to_vec())
            .expire("sess:a:1", Duration::from_secs(60));

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.ops()[1],
            BatchOp::Expire {
                key: "sess:a:1".to_string(),
                ttl: Duration::from_secs(60),
            }
        );
    }
}
