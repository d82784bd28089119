//! In-memory directory used by the tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ldap3::Scope;
use roombook_core::RoombookConfig;

use crate::ldap::config::{DirectoryServerConfig, LdapFlags, ServerTable};
use crate::ldap::connection::{DirectoryConnector, DirectoryEntry, DirectoryError, DirectorySession};

/// Something a session did, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Connect(String),
    Bind { host: String, dn: Option<String> },
    Search { host: String, base: String, filter: String },
    Read { host: String, dn: String, attrs: Vec<String> },
    Unbind(String),
}

#[derive(Default)]
struct MemoryServer {
    entries: Vec<DirectoryEntry>,
    passwords: HashMap<String, String>,
    deny_anonymous: bool,
}

#[derive(Default)]
struct State {
    servers: HashMap<String, MemoryServer>,
    events: Vec<Event>,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, toml: &str) -> ServerTable {
        let config = RoombookConfig::from_toml(toml).unwrap();
        ServerTable::from_settings(&config.ldap).unwrap()
    }

    /// Hosts that were never added refuse connections
    pub fn add_server(&self, host: &str) {
        self.state
            .lock()
            .unwrap()
            .servers
            .insert(host.to_string(), MemoryServer::default());
    }

    pub fn deny_anonymous(&self, host: &str) {
        self.with_server(host, |server| server.deny_anonymous = true);
    }

    pub fn add_entry(&self, host: &str, entry: DirectoryEntry) {
        self.with_server(host, |server| server.entries.push(entry));
    }

    pub fn add_user(&self, host: &str, dn: &str, password: &str) {
        self.with_server(host, |server| {
            server.passwords.insert(dn.to_lowercase(), password.to_string())
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn connections(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Connect(host) => Some(host),
                _ => None,
            })
            .collect()
    }

    pub fn reads(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Read { host, dn, .. } => Some((host, dn)),
                _ => None,
            })
            .collect()
    }

    fn with_server<R>(&self, host: &str, f: impl FnOnce(&mut MemoryServer) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        let server = state
            .servers
            .get_mut(host)
            .expect("server must be added first");
        f(server)
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl DirectoryConnector for MemoryDirectory {
    async fn connect(
        &self,
        server: &DirectoryServerConfig,
        _flags: LdapFlags,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        if !self.state.lock().unwrap().servers.contains_key(&server.host) {
            return Err(DirectoryError::Connection {
                url: server.url(),
                message: "connection refused".to_string(),
            });
        }

        self.record(Event::Connect(server.host.clone()));
        Ok(Box::new(MemorySession {
            directory: self.clone(),
            host: server.host.clone(),
        }))
    }
}

struct MemorySession {
    directory: MemoryDirectory,
    host: String,
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn bind(&mut self, dn: Option<&str>, password: Option<&str>) -> Result<(), DirectoryError> {
        self.directory.record(Event::Bind {
            host: self.host.clone(),
            dn: dn.map(str::to_string),
        });

        self.directory.with_server(&self.host, |server| match (dn, password) {
            (None, None) | (Some(""), _) if !server.deny_anonymous => Ok(()),
            (None, None) | (Some(""), _) => Err(DirectoryError::bind_failed(48, "anonymous bind refused")),
            (Some(dn), password) => match server.passwords.get(&dn.to_lowercase()) {
                Some(expected) if Some(expected.as_str()) == password => Ok(()),
                _ => Err(DirectoryError::bind_failed(49, "invalid credentials")),
            },
            (None, Some(_)) => Err(DirectoryError::bind_failed(49, "invalid credentials")),
        })
    }

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let event = match scope {
            Scope::Base => Event::Read {
                host: self.host.clone(),
                dn: base.to_string(),
                attrs: attrs.iter().map(|a| a.to_string()).collect(),
            },
            _ => Event::Search {
                host: self.host.clone(),
                base: base.to_string(),
                filter: filter.to_string(),
            },
        };
        self.directory.record(event);

        let base = base.to_lowercase();
        Ok(self.directory.with_server(&self.host, |server| {
            server
                .entries
                .iter()
                .filter(|entry| {
                    let dn = entry.dn.to_lowercase();
                    match scope {
                        Scope::Base => dn == base,
                        Scope::OneLevel | Scope::Subtree => dn.ends_with(&base),
                    }
                })
                .filter(|entry| filter_matches(filter, entry))
                .map(|entry| project(entry, attrs))
                .collect()
        }))
    }

    async fn unbind(&mut self) {
        self.directory.record(Event::Unbind(self.host.clone()));
    }
}

/// Keep only the requested attributes; "1.1" requests none
fn project(entry: &DirectoryEntry, attrs: &[&str]) -> DirectoryEntry {
    if attrs.is_empty() {
        return entry.clone();
    }

    DirectoryEntry {
        dn: entry.dn.clone(),
        attrs: entry
            .attrs
            .iter()
            .filter(|(name, _)| attrs.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
    }
}

/// Equality, presence and `&` filters
fn filter_matches(filter: &str, entry: &DirectoryEntry) -> bool {
    let filter = filter.trim();
    let inner = filter
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .unwrap_or(filter);

    if let Some(rest) = inner.strip_prefix('&') {
        return components(rest).iter().all(|c| filter_matches(c, entry));
    }

    match inner.split_once('=') {
        Some((attr, "*")) => {
            attr.eq_ignore_ascii_case("objectclass") || entry.values(attr).is_some()
        }
        Some((attr, value)) if attr.eq_ignore_ascii_case("distinguishedName") => {
            entry.dn.eq_ignore_ascii_case(value)
        }
        Some((attr, value)) => entry
            .values(attr)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        None => false,
    }
}

fn components(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;

    for (i, ch) in list.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    parts.push(&list[start..=i]);
                }
            }
            _ => {}
        }
    }

    parts
}
