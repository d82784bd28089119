//! Per-server LDAP configuration
//!
//! [`LdapSettings`] keys are given either once or as one entry per server.
//! [`ServerTable::from_settings`] checks that every list has the same length
//! and repeats single values so each server sees a complete configuration.

use roombook_core::config::{ConfigValue, DerefPolicy, LdapSettings};
use roombook_core::{Error, Result};

/// Settings of one directory server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryServerConfig {
    /// Position in the configuration lists
    pub index: usize,
    pub host: String,
    pub port: Option<u16>,
    pub base_dn: Option<String>,
    pub user_attrib: Option<String>,
    pub dn_search_attrib: Option<String>,
    pub dn_search_dn: Option<String>,
    pub dn_search_password: Option<String>,
    pub filter: Option<String>,
    pub group_member_attrib: Option<String>,
    pub admin_group_dn: Option<String>,
    pub v3: bool,
    pub tls: bool,
    pub email_attrib: Option<String>,
    pub name_attrib: Option<String>,
    pub disable_referrals: bool,
    pub deref: Option<DerefPolicy>,
    pub filter_base_dn: Option<String>,
    pub filter_user_attr: Option<String>,
}

impl DirectoryServerConfig {
    /// Connection URL. Bare host names get the `ldap://` scheme; the port is
    /// appended unless the host already carries one.
    pub fn url(&self) -> String {
        let (scheme, authority) = match self.host.split_once("://") {
            Some((scheme, rest)) => (scheme, rest.trim_end_matches('/')),
            None => ("ldap", self.host.as_str()),
        };

        match self.port {
            Some(port) if !has_port(authority) => format!("{scheme}://{authority}:{port}"),
            _ => format!("{scheme}://{authority}"),
        }
    }

    /// Whether the connection is already encrypted by the scheme
    pub fn is_ldaps(&self) -> bool {
        self.host.starts_with("ldaps://")
    }
}

/// Whether `authority` ends in `:<port>`. IPv6 literals are bracketed, so
/// their colons are skipped.
fn has_port(authority: &str) -> bool {
    let host_end = if authority.starts_with('[') {
        match authority.find(']') {
            Some(idx) => idx,
            None => return false,
        }
    } else {
        0
    };

    authority[host_end..]
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

/// Settings shared by every server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LdapFlags {
    pub suppress_invalid_credentials: bool,
    pub debug: bool,
    pub get_user_email: bool,
}

/// Immutable list of directory servers, in the order they are tried
#[derive(Debug, Clone)]
pub struct ServerTable {
    servers: Vec<DirectoryServerConfig>,
    flags: LdapFlags,
}

impl ServerTable {
    pub fn from_settings(settings: &LdapSettings) -> Result<Self> {
        let count = broadcast_count(settings)?;

        let host = settings
            .host
            .as_ref()
            .ok_or_else(|| Error::Config("LDAP host is not configured".to_string()))?;

        let mut servers = Vec::with_capacity(count);
        for idx in 0..count {
            let host = host
                .get(idx)
                .filter(|h| !h.is_empty())
                .cloned()
                .ok_or_else(|| Error::Config(format!("LDAP host for server {} is empty", idx)))?;

            servers.push(DirectoryServerConfig {
                index: idx,
                host,
                port: settings.port.as_ref().and_then(|v| v.get(idx)).copied(),
                base_dn: text(&settings.base_dn, idx),
                user_attrib: text(&settings.user_attrib, idx),
                dn_search_attrib: text(&settings.dn_search_attrib, idx),
                dn_search_dn: text(&settings.dn_search_dn, idx),
                dn_search_password: settings
                    .dn_search_password
                    .as_ref()
                    .and_then(|v| v.get(idx))
                    .cloned(),
                filter: text(&settings.filter, idx),
                group_member_attrib: text(&settings.group_member_attrib, idx),
                admin_group_dn: text(&settings.admin_group_dn, idx),
                v3: flag(&settings.v3, idx),
                tls: flag(&settings.tls, idx),
                email_attrib: text(&settings.email_attrib, idx),
                name_attrib: text(&settings.name_attrib, idx),
                disable_referrals: flag(&settings.disable_referrals, idx),
                deref: settings.deref.as_ref().and_then(|v| v.get(idx)).copied(),
                filter_base_dn: text(&settings.filter_base_dn, idx),
                filter_user_attr: text(&settings.filter_user_attr, idx),
            });
        }

        Ok(Self {
            servers,
            flags: LdapFlags {
                suppress_invalid_credentials: settings.suppress_invalid_credentials,
                debug: settings.debug,
                get_user_email: settings.get_user_email,
            },
        })
    }

    pub fn servers(&self) -> &[DirectoryServerConfig] {
        &self.servers
    }

    pub fn flags(&self) -> LdapFlags {
        self.flags
    }

    /// Whether any server names an admin group
    pub fn has_admin_group(&self) -> bool {
        self.servers.iter().any(|s| s.admin_group_dn.is_some())
    }
}

/// Number of servers described by `settings`: the common length of the list
/// values, or 1 when every value is given once.
fn broadcast_count(settings: &LdapSettings) -> Result<usize> {
    let lengths: [(&'static str, Option<usize>); 18] = [
        ("host", list_len(&settings.host)),
        ("port", list_len(&settings.port)),
        ("base_dn", list_len(&settings.base_dn)),
        ("user_attrib", list_len(&settings.user_attrib)),
        ("dn_search_attrib", list_len(&settings.dn_search_attrib)),
        ("dn_search_dn", list_len(&settings.dn_search_dn)),
        ("dn_search_password", list_len(&settings.dn_search_password)),
        ("filter", list_len(&settings.filter)),
        ("group_member_attrib", list_len(&settings.group_member_attrib)),
        ("admin_group_dn", list_len(&settings.admin_group_dn)),
        ("v3", list_len(&settings.v3)),
        ("tls", list_len(&settings.tls)),
        ("email_attrib", list_len(&settings.email_attrib)),
        ("name_attrib", list_len(&settings.name_attrib)),
        ("disable_referrals", list_len(&settings.disable_referrals)),
        ("deref", list_len(&settings.deref)),
        ("filter_base_dn", list_len(&settings.filter_base_dn)),
        ("filter_user_attr", list_len(&settings.filter_user_attr)),
    ];

    let mut count = None;
    for (key, len) in lengths {
        let Some(len) = len else { continue };
        match count {
            None => count = Some(len),
            Some(expected) if expected != len => {
                return Err(Error::ConfigLengthMismatch {
                    key,
                    expected,
                    found: len,
                });
            }
            Some(_) => {}
        }
    }

    Ok(count.unwrap_or(1))
}

fn list_len<T>(value: &Option<ConfigValue<T>>) -> Option<usize> {
    value.as_ref().and_then(ConfigValue::list_len)
}

/// Text value for server `idx`, empty strings count as unset
fn text(value: &Option<ConfigValue<String>>, idx: usize) -> Option<String> {
    value
        .as_ref()
        .and_then(|v| v.get(idx))
        .filter(|s| !s.is_empty())
        .cloned()
}

fn flag(value: &Option<ConfigValue<bool>>, idx: usize) -> bool {
    value
        .as_ref()
        .and_then(|v| v.get(idx))
        .copied()
        .unwrap_or(false)
}
