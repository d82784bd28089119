//! LDAP client: runs a lookup against every configured server in turn

use std::sync::Arc;

use roombook_core::config::LdapSettings;
use roombook_core::Result;

use crate::ldap::config::{DirectoryServerConfig, LdapFlags, ServerTable};
use crate::ldap::connection::{DirectoryConnector, DirectorySession, Ldap3Connector};
use crate::ldap::lookup::{LookupContext, LookupKind, LookupValue};
use crate::ldap::resolver::resolve_dn;

/// Result of [`LdapClient::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// First server that answered
    Matched { username: String, value: LookupValue },
    /// No server answered
    NotFound,
    /// Every server was visited; answers in server order
    Completed(Vec<LookupValue>),
}

impl RunOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, RunOutcome::Matched { .. })
    }

    pub fn into_value(self) -> Option<LookupValue> {
        match self {
            RunOutcome::Matched { value, .. } => Some(value),
            RunOutcome::NotFound | RunOutcome::Completed(_) => None,
        }
    }
}

/// LDAP client over an immutable server table
pub struct LdapClient {
    table: ServerTable,
    connector: Arc<dyn DirectoryConnector>,
}

impl LdapClient {
    /// Create a client using ldap3 connections
    pub fn new(settings: &LdapSettings) -> Result<Self> {
        Ok(Self::with_connector(
            ServerTable::from_settings(settings)?,
            Arc::new(Ldap3Connector::default()),
        ))
    }

    pub fn with_connector(table: ServerTable, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { table, connector }
    }

    pub fn servers(&self) -> &[DirectoryServerConfig] {
        self.table.servers()
    }

    pub fn flags(&self) -> LdapFlags {
        self.table.flags()
    }

    pub fn has_admin_group(&self) -> bool {
        self.table.has_admin_group()
    }

    /// Run `kind` for `username` on each server in configuration order.
    ///
    /// Stops at the first server that answers unless `keep_going` is set, in
    /// which case every server is visited. Each session is unbound before the
    /// next server is tried.
    pub async fn run(&self, kind: LookupKind<'_>, username: &str, keep_going: bool) -> RunOutcome {
        let flags = self.flags();
        let mut found = Vec::new();

        for server in self.table.servers() {
            let mut session = match self.connector.connect(server, flags).await {
                Ok(session) => session,
                Err(e) => {
                    ldap_debug!(flags.debug, "No connection to server {}: {}", server.index, e);
                    continue;
                }
            };

            let value = self.attempt(session.as_mut(), server, kind, username).await;
            session.unbind().await;

            match value {
                Some(value) if !keep_going => {
                    return RunOutcome::Matched {
                        username: username.to_string(),
                        value,
                    };
                }
                Some(value) => found.push(value),
                None => {}
            }
        }

        if keep_going {
            RunOutcome::Completed(found)
        } else {
            RunOutcome::NotFound
        }
    }

    async fn attempt(
        &self,
        session: &mut dyn DirectorySession,
        server: &DirectoryServerConfig,
        kind: LookupKind<'_>,
        username: &str,
    ) -> Option<LookupValue> {
        let flags = self.flags();

        let Some(resolved) = resolve_dn(session, server, username, flags).await else {
            ldap_debug!(flags.debug, "No DN determined on server {}, skipping lookup", server.index);
            return None;
        };

        let ctx = LookupContext {
            server,
            base_dn: server.base_dn.as_deref().unwrap_or_default(),
            dn: &resolved.dn,
            user_search: &resolved.user_search,
            username,
            flags,
        };

        kind.fetch(session, &ctx).await
    }
}
