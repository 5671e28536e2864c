// Session field storage
// One hash record per session; each hash field holds one encoded top-level value

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use sesslock_backend::{Batch, KvBackend};
use sesslock_common::{Result, SessionError, record_key};

use crate::codec::Codec;

/// Hash field marking that a record has been created
pub const TOUCH_MARKER: &str = "__touched";

/// Outcome of [`FieldStore::initialize_if_absent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// The record was created by this call
    New,
    /// The record already existed
    Existing,
}

/// Field-level access to one session record
#[derive(Clone)]
pub struct FieldStore {
    backend: Arc<dyn KvBackend>,
    codec: Arc<dyn Codec>,
    session_name: String,
    session_id: String,
    record_key: String,
    ttl: Duration,
}

impl FieldStore {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        codec: Arc<dyn Codec>,
        session_name: impl Into<String>,
        session_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let session_name = session_name.into();
        let session_id = session_id.into();
        let record_key = record_key(&session_name, &session_id);
        Self {
            backend,
            codec,
            session_name,
            session_id,
            record_key,
            ttl,
        }
    }

    /// The same store addressing another session id of the same namespace
    pub fn for_session_id(&self, session_id: impl Into<String>) -> Self {
        Self::new(
            self.backend.clone(),
            self.codec.clone(),
            self.session_name.clone(),
            session_id,
            self.ttl,
        )
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create the record if it does not exist yet, applying the TTL only then
    pub async fn initialize_if_absent(&self) -> Result<RecordState> {
        let created = self
            .backend
            .hash_set_if_absent(&self.record_key, TOUCH_MARKER, touch_value().as_bytes())
            .await?;

        if !created {
            return Ok(RecordState::Existing);
        }

        self.backend.expire(&self.record_key, self.ttl).await?;
        debug!(
            record = %self.record_key,
            ttl_secs = self.ttl.as_secs(),
            "Created session record"
        );
        Ok(RecordState::New)
    }

    /// Every stored field except the touch marker, decoded
    pub async fn read_all(&self) -> Result<Map<String, Value>> {
        let raw = self.backend.hash_get_all(&self.record_key).await?;
        let mut fields = Map::new();
        for (name, bytes) in raw {
            if name == TOUCH_MARKER {
                continue;
            }
            let value = self.codec.decode(&bytes)?;
            fields.insert(name, value);
        }
        Ok(fields)
    }

    pub async fn read_field(&self, name: &str) -> Result<Option<Value>> {
        validate_field(name)?;
        match self.backend.hash_get(&self.record_key, name).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and store one field. Locking and TTL are the caller's concern.
    pub async fn write_field(&self, name: &str, value: &Value) -> Result<()> {
        validate_field(name)?;
        let bytes = self.codec.encode(value)?;
        self.backend
            .hash_set(&self.record_key, name, &bytes)
            .await?;
        debug!(record = %self.record_key, field = %name, bytes = bytes.len(), "Wrote field");
        Ok(())
    }

    /// Remove one field; `true` when it existed
    pub async fn delete_field(&self, name: &str) -> Result<bool> {
        validate_field(name)?;
        let removed = self.backend.hash_delete(&self.record_key, name).await?;
        debug!(record = %self.record_key, field = %name, removed, "Deleted field");
        Ok(removed > 0)
    }

    /// Re-apply `ttl` to the whole record
    pub async fn refresh_expiry(&self, ttl: Duration) -> Result<bool> {
        self.backend.expire(&self.record_key, ttl).await
    }

    /// Delete the whole record; `true` when it existed
    pub async fn destroy(&self) -> Result<bool> {
        let removed = self.backend.delete(&self.record_key).await?;
        debug!(record = %self.record_key, removed, "Destroyed session record");
        Ok(removed)
    }

    /// Write the touch marker, every given field and the TTL as one batch
    pub async fn persist_all(&self, fields: &Map<String, Value>) -> Result<()> {
        let mut batch = Batch::new();
        batch.hash_set_if_absent(&self.record_key, TOUCH_MARKER, touch_value().into_bytes());
        for (name, value) in fields {
            validate_field(name)?;
            batch.hash_set(&self.record_key, name, self.codec.encode(value)?);
        }
        batch.expire(&self.record_key, self.ttl);

        self.backend.execute(batch).await?;
        debug!(record = %self.record_key, fields = fields.len(), "Persisted session record");
        Ok(())
    }
}

impl std::fmt::Debug for FieldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldStore")
            .field("record_key", &self.record_key)
            .field("codec", &self.codec.name())
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn validate_field(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SessionError::invalid_argument(
            "field name must not be empty",
        ));
    }
    if name == TOUCH_MARKER {
        return Err(SessionError::invalid_argument(format!(
            "field name '{}' is reserved",
            TOUCH_MARKER
        )));
    }
    Ok(())
}

fn touch_value() -> String {
    chrono::Utc::now().timestamp().to_string()
}
