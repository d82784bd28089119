//! Authentication for Roombook
//!
//! Users are validated and described by LDAP/Active Directory servers; the
//! login form flow sits on top of any [`AuthBackend`].

use async_trait::async_trait;
use roombook_core::types::User;

pub mod defaults;
pub mod ldap;
pub mod session;

pub use defaults::{DefaultIdentity, StaticDefaults};
pub use ldap::{LdapAuthProvider, LdapClient, LookupKind, LookupValue, RunOutcome};
pub use session::{FormAction, LoginError, LoginForm, LoginOutcome, SessionManager};

/// Source of user identities
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// The validated username, or `None` when the credentials are rejected
    async fn validate_user(&self, username: &str, password: &str) -> Option<String>;

    async fn get_user(&self, username: &str) -> User;
}
