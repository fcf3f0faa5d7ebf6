//! Redis lock store for `redlock`.
//!
//! Provides [`RedisLockStore`], an implementation of
//! [`LockStore`](redlock::LockStore) over a `deadpool-redis` connection
//! pool.
//!
//! # Guarantees
//!
//! Against a single Redis instance at most one token holds a key at any
//! time, as long as the critical section finishes within the lease. With
//! replication (Sentinel or Cluster) a failover right after an acquire can
//! lose the record, because replication is asynchronous; a second client
//! may then take the same lock.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlock::RedLock;
//! use redlock_redis::{RedisConfig, RedisLockStore};
//!
//! let store = RedisLockStore::new(&RedisConfig::new("redis://localhost:6379"))?;
//! store.ping().await?;
//! let lock = RedLock::new(Arc::new(store));
//!
//! if lock.acquire("invoice-42", &request_id, &lock.options()).await? {
//!     // Critical section...
//!     lock.release("invoice-42", &request_id).await?;
//! }
//! ```

mod config;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisLockStore;
