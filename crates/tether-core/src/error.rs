//! Error taxonomy
//!
//! Every fallible operation in the runtime reports one of a small fixed set
//! of conditions. The set mirrors POSIX status codes so that the C surface
//! can map them one-to-one.

use std::fmt;

/// Runtime errors
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// Null, stale or never-issued handle, or a handle of the wrong kind
    #[error("Invalid handle")]
    InvalidHandle,

    /// Argument rejected before any work was done
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Allocation failed or the handle space is full
    #[error("Resource exhausted")]
    Exhausted,

    /// A bounded wait expired
    #[error("Operation timed out")]
    TimedOut,

    /// The resource is shutting down or already shut down
    #[error("Resource shut down")]
    Shutdown,

    /// The key or task does not exist (anymore)
    #[error("Not found")]
    NotFound,
}

impl Error {
    /// Whether the caller may reasonably retry the same operation later
    pub fn is_transient(self) -> bool {
        matches!(self, Error::Exhausted | Error::TimedOut)
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// A value handed back to the caller because the operation that was meant
/// to take ownership of it failed.
pub struct Rejected<T> {
    /// Why the operation failed
    pub error: Error,
    /// The value that was not consumed
    pub item: T,
}

impl<T> Rejected<T> {
    pub(crate) fn new(error: Error, item: T) -> Self {
        Self { error, item }
    }

    /// Take the rejected value back
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for Rejected<T> {}

impl<T> From<Rejected<T>> for Error {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}
