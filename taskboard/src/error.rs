//! Application error type.

use crate::config::ConfigError;
use crate::persistence::StorageError;
use taskboard_runtime::StoreError;
use thiserror::Error;

/// Errors returned by the taskboard services
///
/// Every variant except [`Error::Config`] and [`Error::UnexpectedReply`] is
/// surfaced to the user as a notification by the service that returns it.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any state changed
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation requires a signed-in user
    #[error("authentication required")]
    Unauthenticated,

    /// The signed-in user lacks the required role
    #[error("access denied: {0}")]
    Forbidden(String),

    /// A store replied with an action the caller did not expect
    #[error("unexpected reply: {0}")]
    UnexpectedReply(&'static str),

    /// The store runtime failed (timeout, shutdown)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Persistent storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for taskboard operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
