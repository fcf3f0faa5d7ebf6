use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// Atomic primitives a backing store must provide for [`RedLock`](crate::RedLock).
///
/// Both mutating operations must be a single indivisible step on the store
/// side. Keys arrive already namespaced.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` with the given expiry, only if `key` is absent.
    ///
    /// `lease` must be a whole number of seconds, at least one; stores
    /// reject anything else with [`LockError::InvalidArgument`] (see
    /// [`lease_secs`]).
    ///
    /// Returns `true` if the record was created, `false` if it already existed.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: Duration,
    ) -> Result<bool, LockError>;

    /// Delete `key` only if its current value equals `expected`.
    ///
    /// Returns `true` if the record was removed.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), LockError>;
}

/// Convert a lease into the whole seconds a store expires records in.
pub fn lease_secs(lease: Duration) -> Result<u64, LockError> {
    if lease.is_zero() {
        return Err(LockError::InvalidArgument(
            "lease must be positive".to_owned(),
        ));
    }
    if lease.subsec_nanos() != 0 {
        return Err(LockError::InvalidArgument(format!(
            "lease must be a whole number of seconds, got {lease:?}"
        )));
    }
    Ok(lease.as_secs())
}
