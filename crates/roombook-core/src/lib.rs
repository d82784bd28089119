//! Roombook Core Library
//!
//! Configuration, error types, logging setup and the user identity shared by
//! the Roombook authentication crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::RoombookConfig;
pub use error::{Error, Result};

/// Roombook version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of every environment variable read by [`RoombookConfig::from_env`]
pub const ENV_PREFIX: &str = "ROOMBOOK_";
