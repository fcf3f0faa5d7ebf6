use std::time::Duration;

use crate::config::AcquireOptions;
use crate::error::LockError;
use crate::lock::RedLock;
use crate::store::LockStore;

const LEASE: Duration = Duration::from_secs(20);

/// Run the store primitive conformance suite.
///
/// Call this from your backend's test module with a fresh store instance.
/// Every key the suite touches starts with `namespace:`, so shared stores
/// should get a unique namespace per run.
///
/// # Errors
///
/// Returns an error if the store fails an operation.
pub async fn run_store_conformance_tests(
    store: &dyn LockStore,
    namespace: &str,
) -> Result<(), LockError> {
    test_ping(store).await?;
    test_set_if_absent(store, &format!("{namespace}:set-if-absent")).await?;
    test_delete_if_equals(store, &format!("{namespace}:delete-if-equals")).await?;
    test_rejects_fractional_lease(store, &format!("{namespace}:fractional")).await?;
    Ok(())
}

async fn test_ping(store: &dyn LockStore) -> Result<(), LockError> {
    store.ping().await
}

async fn test_set_if_absent(store: &dyn LockStore, key: &str) -> Result<(), LockError> {
    assert!(
        store.set_if_absent(key, "v1", LEASE).await?,
        "set_if_absent on a missing key should create it"
    );
    assert!(
        !store.set_if_absent(key, "v2", LEASE).await?,
        "set_if_absent on an existing key should not overwrite it"
    );
    assert!(
        store.delete_if_equals(key, "v1").await?,
        "original value should remain after a refused set"
    );
    Ok(())
}

async fn test_delete_if_equals(store: &dyn LockStore, key: &str) -> Result<(), LockError> {
    assert!(
        !store.delete_if_equals(key, "v1").await?,
        "delete on a missing key should report false"
    );
    store.set_if_absent(key, "v1", LEASE).await?;
    assert!(
        !store.delete_if_equals(key, "other").await?,
        "delete with the wrong value should report false"
    );
    assert!(
        store.delete_if_equals(key, "v1").await?,
        "delete with the stored value should succeed"
    );
    assert!(
        store.set_if_absent(key, "v2", LEASE).await?,
        "key should be free after a matching delete"
    );
    store.delete_if_equals(key, "v2").await?;
    Ok(())
}

async fn test_rejects_fractional_lease(store: &dyn LockStore, key: &str) -> Result<(), LockError> {
    let result = store
        .set_if_absent(key, "v1", Duration::from_millis(1500))
        .await;
    assert!(
        matches!(result, Err(LockError::InvalidArgument(_))),
        "a fractional lease should be rejected"
    );
    assert!(
        store.set_if_absent(key, "v1", LEASE).await?,
        "a rejected set must not create the record"
    );
    store.delete_if_equals(key, "v1").await?;
    Ok(())
}

/// Run the lock behavior conformance suite on top of any store.
///
/// # Errors
///
/// Returns an error if the underlying store fails an operation.
pub async fn run_lock_conformance_tests<S>(lock: &RedLock<S>) -> Result<(), LockError>
where
    S: ?Sized + LockStore,
{
    test_invoice_scenario(lock).await?;
    test_mutual_exclusion(lock).await?;
    test_ownership_scoped_release(lock).await?;
    test_double_release(lock).await?;
    test_release_never_held(lock).await?;
    Ok(())
}

fn opts() -> AcquireOptions {
    AcquireOptions::from_units(20, 0, 100_000)
}

async fn test_invoice_scenario<S>(lock: &RedLock<S>) -> Result<(), LockError>
where
    S: ?Sized + LockStore,
{
    assert!(lock.acquire("invoice-42", "req-A", &opts()).await?);
    assert!(!lock.acquire("invoice-42", "req-B", &opts()).await?);
    assert!(!lock.release("invoice-42", "req-B").await?);
    assert!(lock.release("invoice-42", "req-A").await?);
    assert!(lock.acquire("invoice-42", "req-C", &opts()).await?);
    lock.release("invoice-42", "req-C").await?;
    Ok(())
}

async fn test_mutual_exclusion<S>(lock: &RedLock<S>) -> Result<(), LockError>
where
    S: ?Sized + LockStore,
{
    assert!(lock.acquire("mutex", "t1", &opts()).await?);
    for contender in ["t2", "t3", "t4"] {
        assert!(
            !lock.acquire("mutex", contender, &opts()).await?,
            "{contender} should not acquire a held lock"
        );
    }
    assert!(
        !lock.acquire("mutex", "t1", &opts()).await?,
        "the lock is not reentrant"
    );
    lock.release("mutex", "t1").await?;
    Ok(())
}

async fn test_ownership_scoped_release<S>(lock: &RedLock<S>) -> Result<(), LockError>
where
    S: ?Sized + LockStore,
{
    assert!(lock.acquire("owned", "t1", &opts()).await?);
    assert!(
        !lock.release("owned", "t2").await?,
        "a foreign token must not release the lock"
    );
    assert!(
        !lock.acquire("owned", "t2", &opts()).await?,
        "lock should still be held after a foreign release"
    );
    assert!(lock.release("owned", "t1").await?);
    Ok(())
}

async fn test_double_release<S>(lock: &RedLock<S>) -> Result<(), LockError>
where
    S: ?Sized + LockStore,
{
    assert!(lock.acquire("twice", "t1", &opts()).await?);
    assert!(lock.release("twice", "t1").await?);
    assert!(
        !lock.release("twice", "t1").await?,
        "second release should find nothing owned"
    );
    Ok(())
}

async fn test_release_never_held<S>(lock: &RedLock<S>) -> Result<(), LockError>
where
    S: ?Sized + LockStore,
{
    assert!(!lock.release("never-held", "t1").await?);
    Ok(())
}
