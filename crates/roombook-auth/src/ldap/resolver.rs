//! User DN resolution

use ldap3::{dn_escape, ldap_escape, Scope};

use crate::ldap::config::{DirectoryServerConfig, LdapFlags};
use crate::ldap::connection::{bind, DirectorySession};

/// Where a user lives on one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDn {
    pub dn: String,
    /// Filter component selecting the user, e.g. `uid=jdoe`. Only used for
    /// the login `filter` clause built when validating credentials.
    pub user_search: String,
}

/// Find the DN of `username` on `server`.
///
/// With `dn_search_attrib` set, binds as the search identity (anonymously
/// unless both search DN and password are configured) and searches the base
/// DN; exactly one match is required. Otherwise the DN is built as
/// `user_attrib=username,base_dn` without contacting the server.
pub async fn resolve_dn(
    session: &mut dyn DirectorySession,
    server: &DirectoryServerConfig,
    username: &str,
    flags: LdapFlags,
) -> Option<ResolvedDn> {
    let Some(base_dn) = server.base_dn.as_deref() else {
        ldap_debug!(flags.debug, "No base DN configured for server {}", server.index);
        return None;
    };

    match server.dn_search_attrib.as_deref() {
        Some(search_attrib) => search_dn(session, server, base_dn, search_attrib, username, flags).await,
        None => {
            let user_attrib = server.user_attrib.as_deref()?;
            let user_search = format!("{}={}", user_attrib, ldap_escape(username));
            let dn = format!("{}={},{}", user_attrib, dn_escape(username), base_dn);

            ldap_debug!(
                flags.debug,
                "Constructed dn '{}' and user_search '{}' using '{}'",
                dn,
                user_search,
                user_attrib
            );

            Some(ResolvedDn { dn, user_search })
        }
    }
}

async fn search_dn(
    session: &mut dyn DirectorySession,
    server: &DirectoryServerConfig,
    base_dn: &str,
    search_attrib: &str,
    username: &str,
    flags: LdapFlags,
) -> Option<ResolvedDn> {
    let bound = match (&server.dn_search_dn, &server.dn_search_password) {
        (Some(dn), Some(password)) => bind(session, Some(dn), Some(password), flags).await,
        _ => bind(session, None, None, flags).await,
    };

    if let Err(e) = bound {
        ldap_debug!(flags.debug, "Initial bind failed: {}", e);
        return None;
    }
    ldap_debug!(flags.debug, "Initial bind was successful");

    let user_search = format!("{}={}", search_attrib, ldap_escape(username));
    let entries = match session
        .search(base_dn, Scope::Subtree, &format!("({})", user_search), &["1.1"])
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            ldap_debug!(flags.debug, "Search for '{}' failed: {}", user_search, e);
            return None;
        }
    };

    if entries.len() != 1 {
        ldap_debug!(
            flags.debug,
            "Found {} entries using '{}' under '{}', expected one",
            entries.len(),
            search_attrib,
            base_dn
        );
        return None;
    }

    let dn = entries.into_iter().next()?.dn;
    ldap_debug!(
        flags.debug,
        "Found one entry using '{}': base_dn '{}' user '{}' dn '{}'",
        search_attrib,
        base_dn,
        username,
        dn
    );

    Some(ResolvedDn { dn, user_search })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::connection::{DirectoryConnector, DirectoryEntry};
    use crate::ldap::memory::{Event, MemoryDirectory};

    const SEARCH_CONFIG: &str = r#"
        [ldap]
        host = "ad"
        base_dn = "dc=corp,dc=com"
        dn_search_attrib = "sAMAccountName"
        dn_search_dn = "cn=reader,dc=corp,dc=com"
        dn_search_password = "reader-pass"
    "#;

    fn directory() -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        directory.add_server("ad");
        directory.add_user("ad", "cn=reader,dc=corp,dc=com", "reader-pass");
        directory
    }

    #[tokio::test]
    async fn test_direct_construction_needs_no_round_trip() {
        let directory = directory();
        let table = directory.table(
            "[ldap]\nhost = \"ad\"\nbase_dn = \"ou=people,dc=corp,dc=com\"\n",
        );
        let mut session = directory.connect(&table.servers()[0], table.flags()).await.unwrap();

        let resolved = resolve_dn(session.as_mut(), &table.servers()[0], "jdoe", table.flags())
            .await
            .unwrap();

        assert_eq!(resolved.dn, "uid=jdoe,ou=people,dc=corp,dc=com");
        assert_eq!(resolved.user_search, "uid=jdoe");
        assert_eq!(directory.events(), vec![Event::Connect("ad".into())]);
    }

    #[tokio::test]
    async fn test_constructed_dn_is_escaped() {
        let directory = directory();
        let table = directory.table("[ldap]\nhost = \"ad\"\nbase_dn = \"dc=corp,dc=com\"\n");
        let mut session = directory.connect(&table.servers()[0], table.flags()).await.unwrap();

        let resolved = resolve_dn(session.as_mut(), &table.servers()[0], "doe, j*", table.flags())
            .await
            .unwrap();

        assert_ne!(resolved.dn, "uid=doe, j*,dc=corp,dc=com");
        assert!(resolved.dn.starts_with("uid=doe\\"));
        assert!(resolved.dn.ends_with(",dc=corp,dc=com"));
        assert!(!resolved.user_search.contains('*'));
    }

    #[tokio::test]
    async fn test_search_bind_single_match() {
        let directory = directory();
        directory.add_entry(
            "ad",
            DirectoryEntry::new("CN=John Doe,OU=Staff,DC=corp,DC=com")
                .with_attr("sAMAccountName", &["jdoe"]),
        );
        let table = directory.table(SEARCH_CONFIG);
        let mut session = directory.connect(&table.servers()[0], table.flags()).await.unwrap();

        let resolved = resolve_dn(session.as_mut(), &table.servers()[0], "jdoe", table.flags())
            .await
            .unwrap();

        assert_eq!(resolved.dn, "CN=John Doe,OU=Staff,DC=corp,DC=com");
        assert_eq!(resolved.user_search, "sAMAccountName=jdoe");
        assert!(directory.events().contains(&Event::Bind {
            host: "ad".into(),
            dn: Some("cn=reader,dc=corp,dc=com".into()),
        }));
    }

    #[tokio::test]
    async fn test_search_bind_requires_exactly_one_match() {
        let directory = directory();
        for dn in ["cn=a,dc=corp,dc=com", "cn=b,dc=corp,dc=com"] {
            directory.add_entry(
                "ad",
                DirectoryEntry::new(dn).with_attr("sAMAccountName", &["dup"]),
            );
        }
        let table = directory.table(SEARCH_CONFIG);
        let server = &table.servers()[0];
        let mut session = directory.connect(server, table.flags()).await.unwrap();

        assert_eq!(resolve_dn(session.as_mut(), server, "dup", table.flags()).await, None);
        assert_eq!(resolve_dn(session.as_mut(), server, "ghost", table.flags()).await, None);
    }

    #[tokio::test]
    async fn test_anonymous_search_bind() {
        let directory = directory();
        directory.add_entry(
            "ad",
            DirectoryEntry::new("uid=jdoe,dc=corp,dc=com").with_attr("uid", &["jdoe"]),
        );
        let table = directory.table(
            "[ldap]\nhost = \"ad\"\nbase_dn = \"dc=corp,dc=com\"\ndn_search_attrib = \"uid\"\n",
        );
        let server = &table.servers()[0];
        let mut session = directory.connect(server, table.flags()).await.unwrap();

        let resolved = resolve_dn(session.as_mut(), server, "jdoe", table.flags()).await;
        assert!(resolved.is_some());
        assert!(directory.events().contains(&Event::Bind {
            host: "ad".into(),
            dn: None,
        }));
    }

    #[tokio::test]
    async fn test_failed_search_bind_skips_search() {
        let directory = directory();
        directory.deny_anonymous("ad");
        let table = directory.table(
            "[ldap]\nhost = \"ad\"\nbase_dn = \"dc=corp,dc=com\"\ndn_search_attrib = \"uid\"\n",
        );
        let server = &table.servers()[0];
        let mut session = directory.connect(server, table.flags()).await.unwrap();

        assert_eq!(resolve_dn(session.as_mut(), server, "jdoe", table.flags()).await, None);
        assert!(!directory
            .events()
            .iter()
            .any(|e| matches!(e, Event::Search { .. })));
    }
}
