// In-memory key-value backend
// Single mutex over the whole keyspace so batches apply atomically; expiry is lazy

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use sesslock_common::{Result, SessionError};

use crate::{Batch, BatchOp, KvBackend};

#[derive(Debug, Clone)]
enum Stored {
    Bytes(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Stored) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn wrong_type(key: &str) -> SessionError {
    SessionError::backend(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

/// Keyspace guarded by [`MemoryBackend`]'s mutex
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Live entry for `key`, dropping it first if it has expired
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            debug!(key = %key, "Evicted expired key");
        }
        self.entries.get_mut(key)
    }

    fn bytes(&mut self, key: &str) -> Result<Option<&mut Vec<u8>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Stored::Bytes(bytes),
                ..
            }) => Ok(Some(bytes)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hash(&mut self, key: &str) -> Result<Option<&mut HashMap<String, Vec<u8>>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Stored::Hash(fields),
                ..
            }) => Ok(Some(fields)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hash_or_create(&mut self, key: &str) -> Result<&mut HashMap<String, Vec<u8>>> {
        if self.hash(key)?.is_none() {
            self.entries
                .insert(key.to_string(), Entry::new(Stored::Hash(HashMap::new())));
        }
        match self.entries.get_mut(key) {
            Some(Entry {
                value: Stored::Hash(fields),
                ..
            }) => Ok(fields),
            _ => Err(wrong_type(key)),
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        self.live(key).is_some() && self.entries.remove(key).is_some()
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    fn hash_set(&mut self, key: &str, field: &str, value: Vec<u8>) -> Result<()> {
        self.hash_or_create(key)?.insert(field.to_string(), value);
        Ok(())
    }

    fn hash_set_if_absent(&mut self, key: &str, field: &str, value: Vec<u8>) -> Result<bool> {
        let fields = self.hash_or_create(key)?;
        if fields.contains_key(field) {
            return Ok(false);
        }
        fields.insert(field.to_string(), value);
        Ok(true)
    }

    fn hash_delete(&mut self, key: &str, field: &str) -> Result<u64> {
        let Some(fields) = self.hash(key)? else {
            return Ok(0);
        };
        let removed = fields.remove(field).is_some();
        // Redis drops a hash once its last field is gone
        if fields.is_empty() {
            self.entries.remove(key);
        }
        Ok(u64::from(removed))
    }

    /// Reject a batch that would hit a key of the wrong type, before any write
    fn validate(&mut self, ops: &[BatchOp]) -> Result<()> {
        for op in ops {
            match op {
                BatchOp::HashSet { key, .. } | BatchOp::HashSetIfAbsent { key, .. } => {
                    self.hash(key)?;
                }
                BatchOp::Expire { .. } => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: BatchOp) -> Result<()> {
        match op {
            BatchOp::HashSet { key, field, value } => self.hash_set(&key, &field, value),
            BatchOp::HashSetIfAbsent { key, field, value } => {
                self.hash_set_if_absent(&key, &field, value).map(|_| ())
            }
            BatchOp::Expire { key, ttl } => {
                self.expire(&key, ttl);
                Ok(())
            }
        }
    }
}

/// Process-local [`KvBackend`] backed by a single mutex-guarded map.
///
/// Every operation, and every batch as a whole, runs under one lock, which
/// makes the set-if-absent and get-set primitives atomic across tasks sharing
/// the backend through an `Arc`. Time-to-live is evaluated lazily against the
/// tokio clock, so paused-time tests can advance past expiries.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    keyspace: Mutex<Keyspace>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live of a live key, `None` if absent or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut keyspace = self.keyspace.lock();
        let expires_at = keyspace.live(key)?.expires_at?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.keyspace
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.bytes(key)?.map(|b| b.clone()))
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        let mut keyspace = self.keyspace.lock();
        if keyspace.live(key).is_some() {
            return Ok(false);
        }
        keyspace
            .entries
            .insert(key.to_string(), Entry::new(Stored::Bytes(value.to_vec())));
        Ok(true)
    }

    async fn get_set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut keyspace = self.keyspace.lock();
        let previous = keyspace.bytes(key)?.map(|b| std::mem::take(b));
        // GETSET discards any time-to-live
        keyspace
            .entries
            .insert(key.to_string(), Entry::new(Stored::Bytes(value.to_vec())));
        Ok(previous)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.keyspace.lock().delete(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.keyspace.lock().live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.keyspace.lock().expire(key, ttl))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut keyspace = self.keyspace.lock();
        let fields = keyspace.hash(key)?;
        Ok(fields.and_then(|fields| fields.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        let mut keyspace = self.keyspace.lock();
        let fields = keyspace.hash(key)?;
        Ok(fields.cloned().unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        self.keyspace.lock().hash_set(key, field, value.to_vec())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<u64> {
        self.keyspace.lock().hash_delete(key, field)
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        self.keyspace
            .lock()
            .hash_set_if_absent(key, field, value.to_vec())
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        let mut keyspace = self.keyspace.lock();
        let ops = batch.into_ops();
        keyspace.validate(&ops)?;
        let count = ops.len();
        for op in ops {
            keyspace.apply(op)?;
        }
        debug!(ops = count, "Applied batch");
        Ok(())
    }
}
