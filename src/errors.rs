//! Discovery Error Hierarchy
//!
//! Lookup, cancellation and directory transport failures surfaced by the
//! registry, plus the configuration and background task errors around them.

use std::fmt;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The name was never passed to `resolve`
    #[error("service {0} not resolved in registry")]
    NotResolved(String),

    /// The name is resolved but no snapshot has been received yet
    #[error("service {0} not found in registry")]
    NotFound(String),

    /// Directory service transport and request failures
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A wait was aborted by one of its cancellation sources
    #[error("Operation cancelled by {0}")]
    Cancelled(CancelSource),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The registry no longer starts poll loops
    #[error("Registry has been shut down")]
    Shutdown,

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),
}

impl Error {
    /// True for both lookup failures: never resolved, or resolved without data.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotResolved(_) | Error::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

/// Which cancellation scope ended a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The watcher's own scope, cancelled by `Watcher::close`
    Watcher,
    /// The token supplied by the caller for this one call
    Caller,
}

impl fmt::Display for CancelSource {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            CancelSource::Watcher => write!(f, "watcher close"),
            CancelSource::Caller => write!(f, "caller"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Remote endpoint unreachable or failing
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// A query did not complete within its deadline
    #[error("Query for {service} timed out after {duration:?}")]
    Timeout { service: String, duration: Duration },

    /// Endpoint is not a parseable URI
    #[error("Invalid endpoint {endpoint}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// Endpoint URI without a host component
    #[error("Endpoint {0} has no host")]
    MissingHost(String),

    /// The directory refused a mutation
    #[error("Directory rejected request: {0}")]
    Rejected(String),
}
