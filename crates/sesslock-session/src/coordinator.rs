//! Lock-aware, path-addressed access to one session
//!
//! The first segment of every path names a top-level field, which is the unit
//! of storage and of locking. Writes and deletes take the field's lock unless
//! this process already holds it, mutate the local mirror, persist the whole
//! field, and only then release the lock they took.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use sesslock_backend::KvBackend;
use sesslock_common::{Result, SessionError, SessionSettings, lock_key};
use sesslock_consistency::{LockOptions, LockService};
use sesslock_path::{PathAddressor, is_empty_value};
use sesslock_store::{Codec, FieldStore, JsonCodec, RecordState};

use crate::host::SessionHost;

/// Future returned by a [`SessionCoordinator::lock_with`] callback
pub type LockedFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// How a mutation relates to the field's lock
#[derive(Debug)]
enum Hold {
    /// Locks are not honoured for this call
    Bypassed,
    /// This process already held the lock before the call
    AlreadyHeld,
    /// The call acquired the lock and must release it
    Acquired(String),
}

impl Hold {
    /// Whether the mirror may be stale because another process could have
    /// written the field since we last saw it
    fn needs_reload(&self) -> bool {
        matches!(self, Hold::Acquired(_))
    }
}

/// Path-addressed view of one session with a local mirror of its fields
pub struct SessionCoordinator {
    host: Box<dyn SessionHost>,
    backend: Arc<dyn KvBackend>,
    locks: Arc<LockService>,
    codec: Arc<dyn Codec>,
    paths: PathAddressor,
    settings: SessionSettings,
    lock_options: LockOptions,
    store: Option<FieldStore>,
    record_state: Option<RecordState>,
    mirror: Map<String, Value>,
}

impl SessionCoordinator {
    pub fn new(
        host: Box<dyn SessionHost>,
        backend: Arc<dyn KvBackend>,
        locks: Arc<LockService>,
        settings: SessionSettings,
    ) -> Self {
        let lock_options = LockOptions::from(&settings);
        Self {
            host,
            backend,
            locks,
            codec: Arc::new(JsonCodec),
            paths: PathAddressor::default(),
            settings,
            lock_options,
            store: None,
            record_state: None,
            mirror: Map::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_paths(mut self, paths: PathAddressor) -> Self {
        self.paths = paths;
        self
    }

    /// Namespace in use: the configured override, else the host's own
    pub fn session_name(&self) -> &str {
        self.settings
            .session_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.host.session_name())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.host.session_id()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn host(&self) -> &dyn SessionHost {
        self.host.as_ref()
    }

    /// Whether the bound record was created by this coordinator
    pub fn is_new(&self) -> bool {
        self.record_state == Some(RecordState::New)
    }

    /// Names of the fields currently mirrored
    pub fn field_names(&self) -> Vec<String> {
        self.mirror.keys().cloned().collect()
    }

    /// Start the host session and bind its record, creating it if needed
    pub async fn start(&mut self) -> Result<RecordState> {
        self.host.start()?;
        self.bind().await?;
        Ok(self.record_state.unwrap_or(RecordState::Existing))
    }

    /// Field store of the active session, binding it on first use or after the
    /// host changed identifiers.
    async fn bind(&mut self) -> Result<FieldStore> {
        self.ensure_active()?;
        let id = self
            .host
            .session_id()
            .ok_or_else(|| {
                SessionError::PreconditionFailed("active session has no identifier".to_string())
            })?
            .to_string();

        if let Some(store) = &self.store
            && store.session_id() == id
        {
            return Ok(store.clone());
        }

        let store = FieldStore::new(
            self.backend.clone(),
            self.codec.clone(),
            self.session_name(),
            id,
            self.settings.ttl,
        );
        let state = store.initialize_if_absent().await?;
        debug!(record = %store.record_key(), state = ?state, "Bound session record");

        self.mirror.clear();
        self.record_state = Some(state);
        self.store = Some(store.clone());
        Ok(store)
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.host.is_active() {
            return Err(SessionError::PreconditionFailed(
                "no active session".to_string(),
            ));
        }
        Ok(())
    }

    fn field_lock_key(&self, store: &FieldStore, field: &str) -> String {
        lock_key(store.session_name(), store.session_id(), field)
    }

    /// Take the field's lock as the call requires; `None` on contention
    async fn hold_field(
        &self,
        store: &FieldStore,
        field: &str,
        honour_locks: bool,
    ) -> Result<Option<Hold>> {
        if !honour_locks {
            return Ok(Some(Hold::Bypassed));
        }

        let key = self.field_lock_key(store, field);
        if self.locks.locked(&key, false).await? {
            return Ok(Some(Hold::AlreadyHeld));
        }
        if self.locks.acquire_with(&key, &self.lock_options).await? {
            return Ok(Some(Hold::Acquired(key)));
        }

        warn!(field = %field, "Field lock contended");
        Ok(None)
    }

    /// Release a lock taken by [`Self::hold_field`], keeping the first error
    async fn finish<T>(&self, hold: Hold, outcome: Result<T>) -> Result<T> {
        let Hold::Acquired(key) = hold else {
            return outcome;
        };

        match self.locks.release(&key).await {
            Ok(true) => {}
            Ok(false) => warn!(lock = %key, "Field lock expired before release"),
            Err(e) if outcome.is_ok() => return Err(e),
            Err(e) => warn!(lock = %key, error = %e, "Failed to release field lock"),
        }
        outcome
    }

    /// Current value of `field`, from the store when reloading or not mirrored
    async fn current_field(
        &self,
        store: &FieldStore,
        field: &str,
        reload: bool,
    ) -> Result<Option<Value>> {
        if !reload && let Some(value) = self.mirror.get(field) {
            return Ok(Some(value.clone()));
        }
        store.read_field(field).await
    }

    /// Set `value` at `path`.
    ///
    /// Returns `Ok(false)` when the field's lock could not be taken.
    pub async fn write(&mut self, path: &str, value: Value, honour_locks: bool) -> Result<bool> {
        let field = self.paths.basename(path)?;
        let store = self.bind().await?;

        let Some(hold) = self.hold_field(&store, &field, honour_locks).await? else {
            return Ok(false);
        };
        let outcome = self
            .write_field(&store, &field, path, value, hold.needs_reload())
            .await;
        self.finish(hold, outcome).await.map(|_| true)
    }

    async fn write_field(
        &mut self,
        store: &FieldStore,
        field: &str,
        path: &str,
        value: Value,
        reload: bool,
    ) -> Result<()> {
        let mut field_value = self
            .current_field(store, field, reload)
            .await?
            .unwrap_or(Value::Null);
        self.paths
            .insert(&mut field_value, self.paths.subpath(path), value);

        store.write_field(field, &field_value).await?;
        self.mirror.insert(field.to_string(), field_value);
        debug!(path = %path, field = %field, "Session value written");
        Ok(())
    }

    /// Value at `path`; the empty path addresses the whole session.
    ///
    /// `cached` reads only the mirror and never touches the store. Otherwise
    /// the field (or the whole record) is read from the store and, with
    /// `cache_update`, copied into the mirror.
    pub async fn read(
        &mut self,
        path: &str,
        cached: bool,
        cache_update: bool,
    ) -> Result<Option<Value>> {
        if cached {
            self.ensure_active()?;
            return self.read_mirror(path);
        }

        let store = self.bind().await?;

        if path.is_empty() {
            let fields = store.read_all().await?;
            if cache_update {
                self.mirror = fields.clone();
            }
            return Ok(Some(Value::Object(fields)));
        }

        let field = self.paths.basename(path)?;
        let value = store.read_field(&field).await?;
        if cache_update {
            match &value {
                Some(v) => {
                    self.mirror.insert(field.clone(), v.clone());
                }
                None => {
                    self.mirror.remove(&field);
                }
            }
        }

        let subpath = self.paths.subpath(path);
        Ok(value.and_then(|v| self.paths.lookup(&v, subpath).cloned()))
    }

    fn read_mirror(&self, path: &str) -> Result<Option<Value>> {
        if path.is_empty() {
            return Ok(Some(Value::Object(self.mirror.clone())));
        }
        let field = self.paths.basename(path)?;
        Ok(self
            .mirror
            .get(&field)
            .and_then(|v| self.paths.lookup(v, self.paths.subpath(path)))
            .cloned())
    }

    /// Every field of the session, read from the store into the mirror
    pub async fn read_all(&mut self) -> Result<Map<String, Value>> {
        match self.read("", false, true).await? {
            Some(Value::Object(fields)) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }

    /// Whether `path` holds a value
    pub async fn check(&mut self, path: &str, cached: bool) -> Result<bool> {
        Ok(self.read(path, cached, true).await?.is_some())
    }

    /// Remove the value at `path`.
    ///
    /// A field left empty is removed from the store entirely. Returns
    /// `Ok(false)` when the field's lock could not be taken.
    pub async fn delete(&mut self, path: &str, honour_locks: bool) -> Result<bool> {
        let field = self.paths.basename(path)?;
        let store = self.bind().await?;

        let Some(hold) = self.hold_field(&store, &field, honour_locks).await? else {
            return Ok(false);
        };
        let outcome = self
            .delete_path(&store, &field, path, hold.needs_reload())
            .await;
        self.finish(hold, outcome).await.map(|_| true)
    }

    async fn delete_path(
        &mut self,
        store: &FieldStore,
        field: &str,
        path: &str,
        reload: bool,
    ) -> Result<()> {
        let subpath = self.paths.subpath(path);

        let remaining = if subpath.is_empty() {
            None
        } else {
            match self.current_field(store, field, reload).await? {
                Some(mut value) => {
                    self.paths.delete(&mut value, subpath);
                    Some(value).filter(|v| !is_empty_value(v))
                }
                None => None,
            }
        };

        match remaining {
            Some(value) => {
                store.write_field(field, &value).await?;
                self.mirror.insert(field.to_string(), value);
            }
            None => {
                store.delete_field(field).await?;
                self.mirror.remove(field);
            }
        }
        debug!(path = %path, field = %field, "Session value deleted");
        Ok(())
    }

    fn scoped_lock_key(&self, store: &FieldStore, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(SessionError::invalid_argument(
                "lock name must not be empty",
            ));
        }
        Ok(lock_key(store.session_name(), store.session_id(), key))
    }

    /// Acquire a lock scoped to this session
    pub async fn lock(&mut self, key: &str) -> Result<bool> {
        let store = self.bind().await?;
        let lock = self.scoped_lock_key(&store, key)?;
        self.locks.acquire_with(&lock, &self.lock_options).await
    }

    /// Release a lock taken with [`Self::lock`]
    pub async fn unlock(&mut self, key: &str) -> Result<bool> {
        let store = self.bind().await?;
        let lock = self.scoped_lock_key(&store, key)?;
        self.locks.release(&lock).await
    }

    pub async fn is_locked(&mut self, key: &str, deep: bool) -> Result<bool> {
        let store = self.bind().await?;
        let lock = self.scoped_lock_key(&store, key)?;
        self.locks.locked(&lock, deep).await
    }

    /// Run `f` while holding a session-scoped lock.
    ///
    /// Returns `Ok(false)` without running `f` on contention; otherwise the
    /// release outcome. An error from `f` is returned after the lock is released.
    pub async fn lock_with<F>(&mut self, key: &str, f: F) -> Result<bool>
    where
        F: for<'a> FnOnce(&'a mut SessionCoordinator) -> LockedFuture<'a>,
    {
        let store = self.bind().await?;
        let lock = self.scoped_lock_key(&store, key)?;
        if !self.locks.acquire_with(&lock, &self.lock_options).await? {
            return Ok(false);
        }

        let outcome = f(&mut *self).await;
        let released = self.locks.release(&lock).await;
        outcome?;
        released
    }

    /// Re-apply the session lifetime to the record
    pub async fn refresh_expiry(&mut self) -> Result<bool> {
        let store = self.bind().await?;
        store.refresh_expiry(self.settings.ttl).await
    }

    /// Delete the whole record and continue under a fresh, empty session
    pub async fn destroy(&mut self) -> Result<String> {
        let old = self.bind().await?;
        old.destroy().await?;
        self.mirror.clear();
        // Rebind from scratch if the rotation below fails
        self.store = None;
        info!(record = %old.record_key(), "Session destroyed");
        self.rotate(&old, true).await
    }

    /// Rotate the session identifier, returning the new one.
    ///
    /// With `clear` the new record starts empty. Otherwise every field, mirrored
    /// or not, is copied under the new identifier in one atomic batch together
    /// with the TTL. The old record is left to expire.
    ///
    /// The host switches to the new identifier only once the new record is
    /// written, so a failed rotation leaves the session on its old record.
    pub async fn renew_identifier(&mut self, clear: bool) -> Result<String> {
        let old = self.bind().await?;
        if !clear {
            for (name, value) in old.read_all().await? {
                self.mirror.entry(name).or_insert(value);
            }
        }
        self.rotate(&old, clear).await
    }

    async fn rotate(&mut self, old: &FieldStore, clear: bool) -> Result<String> {
        let new_id = self.host.generate_id();
        let store = old.for_session_id(new_id.clone());

        let state = if clear {
            store.initialize_if_absent().await?
        } else {
            store.persist_all(&self.mirror).await?;
            RecordState::Existing
        };
        self.host.regenerate_id(&new_id)?;

        if clear {
            self.mirror.clear();
        }
        self.record_state = Some(state);
        info!(
            old_record = %old.record_key(),
            new_record = %store.record_key(),
            cleared = clear,
            "Session identifier renewed"
        );
        self.store = Some(store);
        Ok(new_id)
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("session_name", &self.session_name())
            .field("session_id", &self.session_id())
            .field("store", &self.store)
            .field("mirrored_fields", &self.mirror.len())
            .finish()
    }
}
