//! Policy error types.

use crate::AccessKind;
use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An access request was refused by policy.
    #[error("access denied ({kind}): {reason}")]
    Denied { kind: AccessKind, reason: String },

    /// The policy configuration is invalid.
    #[error("invalid policy: {0}")]
    Invalid(String),

    /// Failed to parse a policy file.
    #[error("failed to parse policy: {0}")]
    Parse(String),

    /// An I/O error occurred while reading policy.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
