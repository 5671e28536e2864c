// Redis key-value backend
// One multiplexed connection shared by every clone; batches run as MULTI/EXEC

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use sesslock_common::{Result, SessionError};

use crate::{Batch, BatchOp, KvBackend};

fn backend_err(err: redis::RedisError) -> SessionError {
    SessionError::backend(err)
}

/// Whole seconds, rounded up so a sub-second ttl never means "expire now"
fn ttl_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// [`KvBackend`] over a Redis server
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl RedisBackend {
    /// Connect to `redis://host:port/db`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_err)?;
        info!(url = %url, "Connected to redis backend");
        Ok(Self { conn })
    }

    /// Build the connection URL from its parts
    pub fn url(host: &str, port: u16, database: i64) -> String {
        format!("redis://{}:{}/{}", host, port, database)
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.conn().get(key).await.map_err(backend_err)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.conn().set_nx(key, value).await.map_err(backend_err)
    }

    async fn get_set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn().getset(key, value).await.map_err(backend_err)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.conn().del(key).await.map_err(backend_err)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.conn().exists(key).await.map_err(backend_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.conn()
            .expire(key, ttl_seconds(ttl))
            .await
            .map_err(backend_err)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        self.conn().hget(key, field).await.map_err(backend_err)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        self.conn().hgetall(key).await.map_err(backend_err)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let _: () = self
            .conn()
            .hset(key, field, value)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<u64> {
        self.conn().hdel(key, field).await.map_err(backend_err)
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        self.conn()
            .hset_nx(key, field, value)
            .await
            .map_err(backend_err)
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                BatchOp::HashSet { key, field, value } => {
                    pipe.hset(key, field, value).ignore();
                }
                BatchOp::HashSetIfAbsent { key, field, value } => {
                    pipe.hset_nx(key, field, value).ignore();
                }
                BatchOp::Expire { key, ttl } => {
                    pipe.expire(key, ttl_seconds(ttl)).ignore();
                }
            }
        }

        let mut conn = self.conn();
        let _: () = pipe.query_async(&mut conn).await.map_err(backend_err)?;
        debug!(ops = count, "Executed redis pipeline");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        assert_eq!(
            RedisBackend::url("127.0.0.1", 6379, 2),
            "redis://127.0.0.1:6379/2"
        );
    }

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(20)), 20);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(1)), 1);
    }
}
