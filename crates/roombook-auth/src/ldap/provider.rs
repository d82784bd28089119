//! LDAP identity provider

use std::sync::Arc;

use async_trait::async_trait;
use roombook_core::config::LdapSettings;
use roombook_core::types::{AccessLevel, User};
use roombook_core::Result;
use tracing::{debug, info};

use crate::defaults::DefaultIdentity;
use crate::ldap::client::{LdapClient, RunOutcome};
use crate::ldap::lookup::{LookupKind, LookupValue};
use crate::AuthBackend;

/// Builds user identities from the configured directory servers
pub struct LdapAuthProvider {
    client: Arc<LdapClient>,
    defaults: Arc<dyn DefaultIdentity>,
}

impl LdapAuthProvider {
    /// Create a new LDAP auth provider. Fails on an inconsistent server
    /// configuration, before any directory is contacted.
    pub fn new(settings: &LdapSettings, defaults: Arc<dyn DefaultIdentity>) -> Result<Self> {
        let client = LdapClient::new(settings)?;
        info!("LDAP provider configured with {} server(s)", client.servers().len());
        Ok(Self::from_client(Arc::new(client), defaults))
    }

    pub fn from_client(client: Arc<LdapClient>, defaults: Arc<dyn DefaultIdentity>) -> Self {
        Self { client, defaults }
    }

    /// Get underlying client
    pub fn client(&self) -> Arc<LdapClient> {
        self.client.clone()
    }

    /// Check a username/password pair. Returns the username when some server
    /// accepts the credentials.
    pub async fn validate_user(&self, username: &str, password: &str) -> Option<String> {
        // An empty password would turn into an anonymous bind
        if username.is_empty() || password.is_empty() {
            return None;
        }

        match self
            .client
            .run(LookupKind::Credentials { password }, username, false)
            .await
        {
            RunOutcome::Matched { username, .. } => {
                debug!("User {} authenticated against LDAP", username);
                Some(username)
            }
            _ => None,
        }
    }

    /// Assemble the identity of `username`
    pub async fn get_user(&self, username: &str) -> User {
        let mut user = User::new(username);
        if username.is_empty() {
            return user;
        }

        user.level = self.get_level(username).await;
        user.display_name = self.get_display_name(username).await;
        user.email = self.get_email(username).await;
        user
    }

    pub async fn get_level(&self, username: &str) -> AccessLevel {
        if username.is_empty() {
            return AccessLevel::None;
        }

        if !self.client.has_admin_group() {
            return self.defaults.default_level(username);
        }

        if self.client.run(LookupKind::AdminGroup, username, false).await.is_match() {
            AccessLevel::Admin
        } else {
            AccessLevel::User
        }
    }

    /// Display name, falling back to the username
    pub async fn get_display_name(&self, username: &str) -> String {
        if username.is_empty() {
            return username.to_string();
        }

        match self.client.run(LookupKind::Name, username, false).await.into_value() {
            Some(LookupValue::Name(name)) => name,
            _ => username.to_string(),
        }
    }

    pub async fn get_email(&self, username: &str) -> String {
        if username.is_empty() {
            return String::new();
        }

        if !self.client.flags().get_user_email {
            return self.defaults.default_email(username);
        }

        match self.client.run(LookupKind::Email, username, false).await.into_value() {
            Some(LookupValue::Email(email)) => email,
            _ => String::new(),
        }
    }
}

#[async_trait]
impl AuthBackend for LdapAuthProvider {
    async fn validate_user(&self, username: &str, password: &str) -> Option<String> {
        LdapAuthProvider::validate_user(self, username, password).await
    }

    async fn get_user(&self, username: &str) -> User {
        LdapAuthProvider::get_user(self, username).await
    }
}
