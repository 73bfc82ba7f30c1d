//! CLI error types.

use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Session creation failed.
    #[error(transparent)]
    Init(#[from] sandbox::InitError),

    /// The capability policy could not be loaded.
    #[error(transparent)]
    Policy(#[from] policy::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
