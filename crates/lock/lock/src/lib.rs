//! Store-backed distributed mutual-exclusion lock.
//!
//! [`RedLock`] takes a lock by atomically creating `prefix:key` with the
//! caller's token and a lease, and releases it with an atomic
//! compare-and-delete so a late release never removes someone else's lock.
//! Backends implement [`LockStore`]; see `redlock-redis` and
//! `redlock-memory`.
//!
//! This is the single-store variant: there is no quorum across several
//! stores and no lease renewal.

pub mod config;
pub mod error;
pub mod lock;
pub mod store;
pub mod testing;
pub mod token;

pub use config::{AcquireOptions, LockConfig};
pub use error::LockError;
pub use lock::RedLock;
pub use store::LockStore;
pub use token::generate_token;
