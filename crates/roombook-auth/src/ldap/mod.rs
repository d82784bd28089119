//! LDAP/Active Directory identity provider
//!
//! Provides:
//! - Credential validation by binding as the user
//! - Display name, email and admin-group lookups
//! - Several directory servers tried in configuration order
//! - Direct DN construction or search-bind DN resolution
//! - STARTTLS, referral suppression and alias dereferencing per server

/// Debug output gated on the `debug` LDAP setting
macro_rules! ldap_debug {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            tracing::debug!($($arg)+);
        }
    };
}

mod client;
mod config;
mod connection;
mod lookup;
mod provider;
mod resolver;

#[cfg(test)]
pub(crate) mod memory;

pub use client::{LdapClient, RunOutcome};
pub use config::{DirectoryServerConfig, LdapFlags, ServerTable};
pub use connection::{
    bind, BindErrorKind, DirectoryConnector, DirectoryEntry, DirectoryError, DirectorySession,
    Ldap3Connector,
};
pub use lookup::{LookupContext, LookupKind, LookupValue};
pub use provider::LdapAuthProvider;
pub use resolver::{resolve_dn, ResolvedDn};
