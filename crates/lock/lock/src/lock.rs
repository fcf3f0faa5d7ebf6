//! Acquisition and release against a [`LockStore`].
//!
//! The lock keeps no state of its own. A record in the store under
//! `prefix:key` holding the caller's token is the only signal of "locked",
//! so any number of processes sharing the store see the same lock.
//!
//! # Timing
//!
//! With a zero timeout `acquire` makes exactly one store call. With a
//! positive timeout it sleeps `poll_interval` between attempts and checks
//! the deadline only after each sleep, so a failed wait can return up to
//! one poll interval past the deadline. Waiters are not queued; every
//! waiter races on each tick.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use crate::config::{AcquireOptions, LockConfig};
use crate::error::LockError;
use crate::store::LockStore;

/// Distributed mutual-exclusion lock over a shared store.
///
/// Cloning is cheap and every clone talks to the same store handle.
pub struct RedLock<S: ?Sized + LockStore> {
    store: Arc<S>,
    config: LockConfig,
}

impl<S: ?Sized + LockStore> Clone for RedLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: ?Sized + LockStore> RedLock<S> {
    /// Create a lock with the default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, LockConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// The injected store handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquisition options built from the configured defaults.
    pub fn options(&self) -> AcquireOptions {
        self.config.options()
    }

    /// Build the store key for a lock.
    pub fn namespaced_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.prefix, key)
    }

    /// Try to take the lock on `key` for `token`.
    ///
    /// Returns `Ok(false)` if another token holds the key for the whole
    /// wait. Transport failures surface as [`LockError::StoreUnavailable`].
    #[instrument(
        name = "redlock.acquire",
        skip(self, opts),
        fields(lease = ?opts.lease, timeout = ?opts.timeout)
    )]
    pub async fn acquire(
        &self,
        key: &str,
        token: &str,
        opts: &AcquireOptions,
    ) -> Result<bool, LockError> {
        check_key(key)?;
        check_token(token)?;
        opts.validate()?;

        let lock_key = self.namespaced_key(key);
        // An unrepresentable deadline means the wait is effectively unbounded.
        let deadline = Instant::now().checked_add(opts.timeout);

        loop {
            if self
                .store
                .set_if_absent(&lock_key, token, opts.lease)
                .await?
            {
                debug!("lock acquired");
                return Ok(true);
            }

            if opts.timeout.is_zero() {
                debug!("lock contended");
                return Ok(false);
            }

            tokio::time::sleep(opts.poll_interval).await;

            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!("gave up waiting for lock");
                return Ok(false);
            }
            trace!("lock still contended, retrying");
        }
    }

    /// Single non-blocking attempt with the given lease.
    pub async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let opts = AcquireOptions::default()
            .with_lease(lease)
            .with_poll_interval(self.options().poll_interval);
        self.acquire(key, token, &opts).await
    }

    /// Release the lock on `key` if `token` still owns it.
    ///
    /// Returns `Ok(false)` when the record is held by another token, has
    /// expired, or never existed.
    #[instrument(name = "redlock.release", skip(self))]
    pub async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        check_key(key)?;
        check_token(token)?;

        let released = self
            .store
            .delete_if_equals(&self.namespaced_key(key), token)
            .await?;
        debug!(released, "lock release");
        Ok(released)
    }

    /// Run `f` while holding the lock.
    ///
    /// Returns `Ok(None)` without running `f` if the lock could not be
    /// taken. Otherwise the lock is released once `f` completes, or once it
    /// panics (the panic is then resumed), and its output is returned. A
    /// lease that ran out during `f` is logged, not reported as an error.
    ///
    /// Dropping the returned future while `f` is running skips the release;
    /// the record then stays until its lease expires.
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        token: &str,
        opts: &AcquireOptions,
        f: F,
    ) -> Result<Option<T>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.acquire(key, token, opts).await? {
            return Ok(None);
        }

        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        let released = self.release(key, token).await;

        let output = match outcome {
            Ok(output) => output,
            Err(payload) => {
                if !matches!(released, Ok(true)) {
                    warn!(key, "lock not released after scoped work panicked");
                }
                panic::resume_unwind(payload);
            }
        };

        if !released? {
            warn!(key, "lease expired before scoped work finished");
        }
        Ok(Some(output))
    }
}

fn check_key(key: &str) -> Result<(), LockError> {
    if key.is_empty() {
        return Err(LockError::InvalidArgument(
            "lock key must not be empty".to_owned(),
        ));
    }
    Ok(())
}

fn check_token(token: &str) -> Result<(), LockError> {
    if token.is_empty() {
        return Err(LockError::InvalidArgument(
            "request token must not be empty".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Store without expiry that counts calls and can simulate an outage.
    #[derive(Default)]
    struct CountingStore {
        records: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
        down: AtomicBool,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn value(&self, key: &str) -> Option<String> {
            self.records.lock().unwrap().get(key).cloned()
        }

        fn enter(&self) -> Result<(), LockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(LockError::StoreUnavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LockStore for CountingStore {
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            _lease: Duration,
        ) -> Result<bool, LockError> {
            self.enter()?;
            let mut records = self.records.lock().unwrap();
            if records.contains_key(key) {
                return Ok(false);
            }
            records.insert(key.to_owned(), value.to_owned());
            Ok(true)
        }

        async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockError> {
            self.enter()?;
            let mut records = self.records.lock().unwrap();
            if records.get(key).map(String::as_str) == Some(expected) {
                records.remove(key);
                return Ok(true);
            }
            Ok(false)
        }

        async fn ping(&self) -> Result<(), LockError> {
            self.enter()
        }
    }

    fn lock() -> RedLock<CountingStore> {
        RedLock::new(Arc::new(CountingStore::default()))
    }

    #[test]
    fn namespaced_key_uses_prefix() {
        let lock = lock();
        assert_eq!(lock.namespaced_key("invoice-42"), "lock:invoice-42");

        let custom = RedLock::with_config(
            Arc::new(CountingStore::default()),
            LockConfig {
                prefix: "jobs".into(),
                ..LockConfig::default()
            },
        );
        assert_eq!(custom.namespaced_key("nightly"), "jobs:nightly");
    }

    #[tokio::test]
    async fn record_is_stored_under_namespaced_key() {
        let lock = lock();
        assert!(lock.acquire("res", "tok", &lock.options()).await.unwrap());
        assert_eq!(lock.store().value("lock:res").as_deref(), Some("tok"));
        assert_eq!(lock.store().value("res"), None);
    }

    #[tokio::test]
    async fn empty_key_is_rejected_without_store_call() {
        let lock = lock();
        let err = lock.acquire("", "tok", &lock.options()).await.unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));

        let err = lock.release("", "tok").await.unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
        assert_eq!(lock.store().calls(), 0);
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let lock = lock();
        let err = lock.acquire("res", "", &lock.options()).await.unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
        assert_eq!(lock.store().calls(), 0);
    }

    #[tokio::test]
    async fn bad_options_are_rejected_without_store_call() {
        let lock = lock();
        let zero_lease = lock.options().with_lease(Duration::ZERO);
        let zero_poll = lock.options().with_poll_interval(Duration::ZERO);

        assert!(matches!(
            lock.acquire("res", "tok", &zero_lease).await,
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            lock.acquire("res", "tok", &zero_poll).await,
            Err(LockError::InvalidArgument(_))
        ));
        assert_eq!(lock.store().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_blocking_contention_makes_one_call_and_does_not_sleep() {
        let lock = lock();
        let opts = lock.options();
        assert!(lock.acquire("res", "a", &opts).await.unwrap());

        let before = Instant::now();
        assert!(!lock.acquire("res", "b", &opts).await.unwrap());
        assert_eq!(Instant::now(), before, "non-blocking acquire must not sleep");
        assert_eq!(lock.store().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_wait_polls_until_deadline() {
        let lock = lock();
        assert!(lock.acquire("res", "a", &lock.options()).await.unwrap());

        let opts = lock
            .options()
            .with_timeout(Duration::from_secs(1))
            .with_poll_interval(Duration::from_millis(100));
        let start = Instant::now();
        assert!(!lock.acquire("res", "b", &opts).await.unwrap());

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1));
        assert!(waited <= Duration::from_secs(1) + Duration::from_millis(100));
        // The holder's acquire, then attempts at 0ms, 100ms, ..., 900ms.
        assert_eq!(lock.store().calls(), 1 + 10);
    }

    #[tokio::test]
    async fn store_outage_is_not_contention() {
        let lock = lock();
        lock.store().down.store(true, Ordering::SeqCst);

        let err = lock
            .acquire("res", "tok", &lock.options().with_timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        let err = lock.release("res", "tok").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn release_requires_matching_token() {
        let lock = lock();
        assert!(lock.acquire("res", "a", &lock.options()).await.unwrap());
        assert!(!lock.release("res", "b").await.unwrap());
        assert_eq!(lock.store().value("lock:res").as_deref(), Some("a"));
        assert!(lock.release("res", "a").await.unwrap());
        assert!(!lock.release("res", "a").await.unwrap());
    }

    #[tokio::test]
    async fn try_acquire_is_single_attempt() {
        let lock = lock();
        assert!(
            lock.try_acquire("res", "a", Duration::from_secs(5))
                .await
                .unwrap()
        );
        assert!(
            !lock
                .try_acquire("res", "b", Duration::from_secs(5))
                .await
                .unwrap()
        );
        assert_eq!(lock.store().calls(), 2);
    }

    #[tokio::test]
    async fn with_lock_runs_and_releases() {
        let lock = lock();
        let out = lock
            .with_lock("res", "a", &lock.options(), || async { 7 })
            .await
            .unwrap();
        assert_eq!(out, Some(7));
        assert_eq!(lock.store().value("lock:res"), None);
    }

    #[tokio::test]
    async fn with_lock_skips_work_under_contention() {
        let lock = lock();
        assert!(lock.acquire("res", "a", &lock.options()).await.unwrap());

        let ran = AtomicBool::new(false);
        let out = lock
            .with_lock("res", "b", &lock.options(), || async {
                ran.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert!(out.is_none());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(lock.store().value("lock:res").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn with_lock_releases_when_work_panics() {
        let lock = lock();
        let scoped = lock.clone();
        let opts = lock.options();

        let handle: tokio::task::JoinHandle<Result<Option<u32>, LockError>> =
            tokio::spawn(async move {
                scoped
                    .with_lock("job", "a", &opts, || async { panic!("scoped work failed") })
                    .await
            });

        let err = handle.await.expect_err("panic should propagate");
        assert!(err.is_panic());
        assert_eq!(lock.store().value("lock:job"), None);
        assert!(lock.acquire("job", "b", &lock.options()).await.unwrap());
    }

    #[tokio::test]
    async fn works_through_trait_object() {
        let store: Arc<dyn LockStore> = Arc::new(CountingStore::default());
        let lock = RedLock::new(store);
        assert!(lock.acquire("res", "a", &lock.options()).await.unwrap());
        assert!(lock.release("res", "a").await.unwrap());
    }
}
