//! Error types for droplet_core.

use thiserror::Error;

/// Result type alias using droplet_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while allocating or reclaiming storage.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Requested filename cannot be stored.
    #[error("Invalid filename {name:?}: {reason}")]
    InvalidFilename { name: String, reason: String },

    /// Token component of a public path is malformed.
    #[error("Invalid token {token:?}: {reason}")]
    InvalidToken { token: String, reason: String },

    /// Configuration values are out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Every candidate token already held the requested filename.
    #[error("No free token found after {attempts} attempts")]
    CollisionExhausted { attempts: usize },
}

impl Error {
    /// Create an InvalidFilename error.
    pub fn invalid_filename(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidFilename {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidToken error.
    pub fn invalid_token(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidToken {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a CollisionExhausted error.
    pub fn collision_exhausted(attempts: usize) -> Self {
        Error::CollisionExhausted { attempts }
    }

    /// True for errors caused by caller input rather than storage state.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidFilename { .. } | Error::InvalidToken { .. }
        )
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
