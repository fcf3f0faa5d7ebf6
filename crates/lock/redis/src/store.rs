use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolError, Runtime};
use redis::{RedisError, Script};
use tracing::debug;

use redlock::error::LockError;
use redlock::store::{LockStore, lease_secs};

use crate::config::RedisConfig;
use crate::scripts;

/// Redis-backed implementation of [`LockStore`].
///
/// Acquisition is a single `SET key value NX EX seconds`. Release runs a
/// Lua compare-and-delete so ownership is checked and the key removed in
/// one server-side step.
pub struct RedisLockStore {
    pool: Pool,
    release_script: Script,
}

impl RedisLockStore {
    /// Create a new `RedisLockStore` from the provided configuration.
    ///
    /// No connection is opened until the first operation; call
    /// [`ping`](LockStore::ping) at startup to fail fast.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::StoreUnavailable`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, LockError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout()))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| LockError::StoreUnavailable(e.to_string()))?
            .map_err(|e| LockError::StoreUnavailable(e.to_string()))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            release_script: Script::new(scripts::LOCK_RELEASE),
        }
    }

    /// Close the pool. Later operations fail with
    /// [`LockError::StoreUnavailable`].
    pub fn close(&self) {
        debug!("closing redis lock store pool");
        self.pool.close();
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, LockError> {
        self.pool.get().await.map_err(pool_error)
    }
}

fn pool_error(e: PoolError) -> LockError {
    LockError::StoreUnavailable(e.to_string())
}

/// Split transport failures from errors the server itself returned.
fn redis_error(e: &RedisError) -> LockError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        LockError::StoreUnavailable(e.to_string())
    } else {
        LockError::Backend(e.to_string())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let secs = lease_secs(lease)?;
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(&e))?;

        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error(&e))?;

        Ok(deleted == 1)
    }

    async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(&e))?;
        Ok(())
    }
}
