//! Directory connections
//!
//! [`DirectoryConnector`] opens one session per server attempt. The ldap3
//! implementation applies the per-server protocol options; tests substitute
//! an in-memory directory.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{DerefAliases, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions, SearchResult};
use roombook_core::config::DerefPolicy;
use thiserror::Error;
use tracing::warn;

use crate::ldap::config::{DirectoryServerConfig, LdapFlags};

/// Result codes from RFC 4511
const LDAP_SUCCESS: u32 = 0;
const LDAP_REFERRAL: u32 = 10;
const LDAP_NO_SUCH_OBJECT: u32 = 32;
const LDAP_INVALID_CREDENTIALS: u32 = 49;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Classification of a failed bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindErrorKind {
    CredentialsInvalid,
    Other,
}

impl BindErrorKind {
    pub fn from_code(rc: u32) -> Self {
        match rc {
            LDAP_INVALID_CREDENTIALS => BindErrorKind::CredentialsInvalid,
            _ => BindErrorKind::Other,
        }
    }
}

/// Failure talking to one directory server
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Failed to connect to LDAP server {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Bind failed with code {code}: {message}")]
    Bind {
        kind: BindErrorKind,
        code: u32,
        message: String,
    },

    #[error("Search failed: {0}")]
    Search(String),
}

impl DirectoryError {
    pub fn bind_failed(code: u32, message: impl Into<String>) -> Self {
        DirectoryError::Bind {
            kind: BindErrorKind::from_code(code),
            code,
            message: message.into(),
        }
    }

    pub fn bind_kind(&self) -> Option<BindErrorKind> {
        match self {
            DirectoryError::Bind { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// One directory object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, values: &[&str]) -> Self {
        self.attrs.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Values of `name`; servers may return attribute names in any case
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// An open connection to one server
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind; anonymous when `dn` and `password` are both `None`
    async fn bind(&mut self, dn: Option<&str>, password: Option<&str>) -> Result<(), DirectoryError>;

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    async fn unbind(&mut self);
}

/// Opens sessions to configured servers
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(
        &self,
        server: &DirectoryServerConfig,
        flags: LdapFlags,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// Bind, reporting failures as warnings. "Invalid credentials" is kept quiet
/// when `suppress_invalid_credentials` is set.
pub async fn bind(
    session: &mut dyn DirectorySession,
    dn: Option<&str>,
    password: Option<&str>,
    flags: LdapFlags,
) -> Result<(), DirectoryError> {
    let result = session.bind(dn, password).await;

    if let Err(e) = &result {
        match e.bind_kind() {
            Some(BindErrorKind::CredentialsInvalid) if flags.suppress_invalid_credentials => {}
            _ => warn!("LDAP bind as {:?} failed: {}", dn.unwrap_or("<anonymous>"), e),
        }
    }

    result
}

/// Production connector backed by ldap3
#[derive(Debug, Clone)]
pub struct Ldap3Connector {
    timeout: Duration,
}

impl Default for Ldap3Connector {
    fn default() -> Self {
        Self {
            timeout: CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(
        &self,
        server: &DirectoryServerConfig,
        flags: LdapFlags,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let url = server.url();

        // A failed STARTTLS fails the connection, so the server is skipped
        // rather than queried in clear text.
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(server.tls && !server.is_ldaps());

        if !server.v3 {
            ldap_debug!(flags.debug, "LDAPv2 is not supported, using v3 for {}", url);
        }

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::Connection {
                url: url.clone(),
                message: e.to_string(),
            })?;

        ldap3::drive!(conn);

        ldap_debug!(flags.debug, "Got LDAP connection to {}", url);

        Ok(Box::new(Ldap3Session {
            ldap,
            deref: server.deref,
            disable_referrals: server.disable_referrals,
        }))
    }
}

struct Ldap3Session {
    ldap: Ldap,
    deref: Option<DerefPolicy>,
    disable_referrals: bool,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: Option<&str>, password: Option<&str>) -> Result<(), DirectoryError> {
        let result = self
            .ldap
            .simple_bind(dn.unwrap_or(""), password.unwrap_or(""))
            .await
            .map_err(|e| DirectoryError::bind_failed(u32::MAX, e.to_string()))?;

        if result.rc != LDAP_SUCCESS {
            return Err(DirectoryError::bind_failed(result.rc, result.text));
        }

        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut options = SearchOptions::new();
        if let Some(deref) = self.deref {
            options = options.deref(deref_aliases(deref));
        }

        let SearchResult(entries, result) = self
            .ldap
            .with_search_options(options)
            .search(base, scope, filter, attrs.to_vec())
            .await
            .map_err(|e| DirectoryError::Search(e.to_string()))?;

        match result.rc {
            LDAP_SUCCESS => {}
            LDAP_REFERRAL if self.disable_referrals => return Ok(Vec::new()),
            LDAP_NO_SUCH_OBJECT => return Ok(Vec::new()),
            rc => {
                return Err(DirectoryError::Search(format!(
                    "code {}: {}",
                    rc, result.text
                )))
            }
        }

        // Continuation references are never chased.
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs.into_iter().collect(),
                }
            })
            .collect())
    }

    async fn unbind(&mut self) {
        let _ = self.ldap.unbind().await;
    }
}

fn deref_aliases(policy: DerefPolicy) -> DerefAliases {
    match policy {
        DerefPolicy::Never => DerefAliases::Never,
        DerefPolicy::Searching => DerefAliases::Searching,
        DerefPolicy::Finding => DerefAliases::Finding,
        DerefPolicy::Always => DerefAliases::Always,
    }
}
