//! Error types for Roombook

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Count of LDAP list settings doesn't match: {key} has {found} entries, expected {expected}")]
    ConfigLengthMismatch {
        key: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigLengthMismatch { .. } => "ConfigurationError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    /// Whether the error must abort startup instead of being reported per request
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigLengthMismatch { .. })
    }
}
