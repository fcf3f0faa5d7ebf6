use thiserror::Error;

/// Errors from lock acquisition and release.
///
/// Contention and non-ownership are not errors: `acquire` and `release`
/// report them as `Ok(false)`.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl LockError {
    /// Whether the failure came from the transport rather than the caller
    /// or the store's reply.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
