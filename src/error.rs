//! Error types for the role guard.

use crate::decision::DenialReason;
use thiserror::Error;

/// The main error type for guarded invocations.
#[derive(Error, Debug)]
pub enum Error {
    /// No caller identity could be resolved for the invocation.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The role directory could not be reached.
    #[error("Role directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The caller was denied access to the guarded operation.
    #[error("Forbidden: {0}")]
    Forbidden(DenialReason),

    /// A guarded operation was registered without any declared requirement.
    #[error("No authorization requirement declared for operation '{0}'")]
    MissingRequirement(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error.
    #[cfg(feature = "persistence")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error is an authorization denial rather than a system failure.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden(_))
    }

    /// Returns the denial reason when this error is a `Forbidden` rejection.
    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            Error::Forbidden(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Result type alias for role guard operations.
pub type Result<T> = std::result::Result<T, Error>;
