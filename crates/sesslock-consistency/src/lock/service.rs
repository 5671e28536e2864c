//! Advisory lock service over a shared key-value store
//!
//! Provides:
//! - Acquire with set-if-absent, stealing locks whose expiry has passed
//! - Owner-checked release
//! - A lock table of keys this service currently holds
//! - Best-effort release of every held lock on shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use sesslock_backend::KvBackend;
use sesslock_common::{Result, SessionError};

use super::model::*;

struct LockStatsCollector {
    total_acquisitions: AtomicU64,
    stolen_locks: AtomicU64,
    failed_acquisitions: AtomicU64,
    total_releases: AtomicU64,
    refused_releases: AtomicU64,
}

impl Default for LockStatsCollector {
    fn default() -> Self {
        Self {
            total_acquisitions: AtomicU64::new(0),
            stolen_locks: AtomicU64::new(0),
            failed_acquisitions: AtomicU64::new(0),
            total_releases: AtomicU64::new(0),
            refused_releases: AtomicU64::new(0),
        }
    }
}

/// Advisory lock service.
///
/// One instance represents one lock owner. Share it between call sites with an
/// `Arc`; the lock table lives exactly as long as the service.
pub struct LockService {
    backend: Arc<dyn KvBackend>,
    owner: String,
    backoff: Duration,
    /// Held lock key -> expiry we wrote (Unix seconds)
    held: Arc<DashMap<String, i64>>,
    stats: Arc<LockStatsCollector>,
}

impl LockService {
    /// Create a service owning locks under a fresh process-unique identity
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_owner(backend, default_owner())
    }

    pub fn with_owner(backend: Arc<dyn KvBackend>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        debug!(owner = %owner, "LockService initialized");
        Self {
            backend,
            owner,
            backoff: LockOptions::default().backoff,
            held: Arc::new(DashMap::new()),
            stats: Arc::new(LockStatsCollector::default()),
        }
    }

    /// Sleep used between acquire attempts by [`LockService::acquire`]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Identity written into every lock this service takes
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Acquire `key`, polling up to `max_attempts` times with the service backoff.
    ///
    /// Returns `Ok(false)` on contention. `timeout` only sets how long the lock
    /// stays valid once taken; the wait is bounded by the attempt count.
    pub async fn acquire(&self, key: &str, timeout: Duration, max_attempts: u32) -> Result<bool> {
        self.acquire_inner(key, timeout, max_attempts, self.backoff)
            .await
    }

    /// Acquire `key` with every parameter taken from `options`
    pub async fn acquire_with(&self, key: &str, options: &LockOptions) -> Result<bool> {
        self.acquire_inner(key, options.timeout, options.max_attempts, options.backoff)
            .await
    }

    async fn acquire_inner(
        &self,
        key: &str,
        timeout: Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Result<bool> {
        validate_key(key)?;

        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            let value = LockValue::expiring_after(now(), timeout, self.owner.as_str());
            let encoded = value.encode();

            if self.backend.set_if_absent(key, encoded.as_bytes()).await? {
                self.record_held(key, value.expires_at);
                debug!(key = %key, owner = %self.owner, attempt, "Lock acquired");
                return Ok(true);
            }

            if self.try_steal(key, &encoded).await? {
                self.record_held(key, value.expires_at);
                self.stats.stolen_locks.fetch_add(1, Ordering::Relaxed);
                info!(key = %key, owner = %self.owner, attempt, "Reclaimed expired lock");
                return Ok(true);
            }

            debug!(key = %key, attempt, attempts, "Lock is held by another owner");
            tokio::time::sleep(backoff).await;
        }

        self.stats
            .failed_acquisitions
            .fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, attempts, "Lock acquisition gave up");
        Ok(false)
    }

    /// Replace an expired lock value, succeeding only if nobody changed it
    /// between our read and our swap.
    ///
    /// Two contenders may both read the same stale value; the loser's swap still
    /// overwrites the winner's value before the comparison fails. That window is
    /// inherent to read-then-getset and is left as is.
    async fn try_steal(&self, key: &str, encoded: &str) -> Result<bool> {
        let Some(snapshot) = self.backend.get(key).await? else {
            // Released between our set-if-absent and this read; retry next attempt.
            return Ok(false);
        };

        // Unparseable values count as expired so corrupt locks cannot wedge a field.
        let expired =
            LockValue::parse(&snapshot).is_none_or(|current| current.is_expired_at(now()));
        if !expired {
            return Ok(false);
        }

        let previous = self.backend.get_set(key, encoded.as_bytes()).await?;
        Ok(previous.as_deref() == Some(snapshot.as_slice()))
    }

    fn record_held(&self, key: &str, expires_at: i64) {
        self.held.insert(key.to_string(), expires_at);
        self.stats
            .total_acquisitions
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Release `key` if this service still owns it.
    ///
    /// An absent key counts as released. A lock that expired, or now carries
    /// another owner, is left untouched and `Ok(false)` is returned; either way
    /// it is dropped from the lock table since it is no longer ours.
    pub async fn release(&self, key: &str) -> Result<bool> {
        validate_key(key)?;

        let released = release_owned(self.backend.as_ref(), &self.owner, key).await;
        self.held.remove(key);

        match released {
            Ok(true) => {
                self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Ok(false) => {
                self.stats.refused_releases.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether this service holds `key`.
    ///
    /// Without `deep` only the lock table is consulted and no I/O happens; a lock
    /// whose recorded expiry has passed no longer counts. With `deep` the key
    /// must also still exist in the store.
    pub async fn locked(&self, key: &str, deep: bool) -> Result<bool> {
        let unexpired = self
            .held
            .get(key)
            .is_some_and(|expires_at| *expires_at >= now());
        if !unexpired {
            return Ok(false);
        }
        if !deep {
            return Ok(true);
        }
        self.backend.exists(key).await
    }

    /// Keys currently recorded as held
    pub fn held_keys(&self) -> Vec<String> {
        self.held.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Release every held lock, ignoring failures; returns how many were released
    pub async fn shutdown(&self) -> usize {
        let keys = self.held_keys();
        let mut released = 0;
        for key in &keys {
            match self.release(key).await {
                Ok(true) => released += 1,
                Ok(false) => debug!(key = %key, "Lock already lost at shutdown"),
                Err(e) => warn!(key = %key, error = %e, "Failed to release lock at shutdown"),
            }
        }
        if !keys.is_empty() {
            info!(held = keys.len(), released, "Released held locks");
        }
        released
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            held_locks: self.held.len(),
            total_acquisitions: self.stats.total_acquisitions.load(Ordering::Relaxed),
            stolen_locks: self.stats.stolen_locks.load(Ordering::Relaxed),
            failed_acquisitions: self.stats.failed_acquisitions.load(Ordering::Relaxed),
            total_releases: self.stats.total_releases.load(Ordering::Relaxed),
            refused_releases: self.stats.refused_releases.load(Ordering::Relaxed),
        }
    }
}

impl Drop for LockService {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let keys: Vec<String> = self.held.iter().map(|e| e.key().clone()).collect();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let backend = self.backend.clone();
                let owner = self.owner.clone();
                handle.spawn(async move {
                    for key in keys {
                        if let Err(e) = release_owned(backend.as_ref(), &owner, &key).await {
                            warn!(key = %key, error = %e, "Failed to release lock on drop");
                        }
                    }
                });
            }
            Err(_) => {
                warn!(
                    held = keys.len(),
                    "LockService dropped outside a runtime; held locks will expire on their own"
                );
            }
        }
    }
}

/// Delete `key` if its value is unexpired and names `owner`
async fn release_owned(backend: &dyn KvBackend, owner: &str, key: &str) -> Result<bool> {
    let Some(raw) = backend.get(key).await? else {
        debug!(key = %key, "Lock already released");
        return Ok(true);
    };

    match LockValue::parse(&raw) {
        Some(value) if !value.is_expired_at(now()) && value.is_owned_by(owner) => {
            backend.delete(key).await?;
            debug!(key = %key, owner = %owner, "Lock released");
            Ok(true)
        }
        Some(value) => {
            warn!(
                key = %key,
                owner = %owner,
                current_owner = %value.owner,
                expires_at = value.expires_at,
                "Refusing to release a lock we no longer own"
            );
            Ok(false)
        }
        None => {
            warn!(key = %key, "Refusing to release an unparseable lock value");
            Ok(false)
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SessionError::invalid_argument("lock key must not be empty"));
    }
    Ok(())
}

/// Owner identity of this process: `<hostname>:<pid>:<uuid>`
pub fn default_owner() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!(
        "{}:{}:{}",
        host,
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    )
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
