//! Attribute lookups run against a resolved user DN

use ldap3::{ldap_escape, Scope};

use crate::ldap::config::{DirectoryServerConfig, LdapFlags};
use crate::ldap::connection::{bind, DirectorySession};

/// What to fetch from the user's entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind<'a> {
    Name,
    Email,
    AdminGroup,
    /// Bind as the user and apply the login filter
    Credentials { password: &'a str },
}

/// A lookup that found its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupValue {
    Name(String),
    Email(String),
    AdminGroup,
    Credentials,
}

/// Inputs of a lookup on one server
#[derive(Debug, Clone, Copy)]
pub struct LookupContext<'a> {
    /// Settings of the server being queried
    pub server: &'a DirectoryServerConfig,
    pub base_dn: &'a str,
    pub dn: &'a str,
    pub user_search: &'a str,
    pub username: &'a str,
    pub flags: LdapFlags,
}

impl LookupKind<'_> {
    pub async fn fetch(
        &self,
        session: &mut dyn DirectorySession,
        ctx: &LookupContext<'_>,
    ) -> Option<LookupValue> {
        ldap_debug!(
            ctx.flags.debug,
            "{} lookup: base_dn '{}' dn '{}' user_search '{}' user '{}'",
            self.name(),
            ctx.base_dn,
            ctx.dn,
            ctx.user_search,
            ctx.username
        );

        if ctx.base_dn.is_empty() || ctx.dn.is_empty() || ctx.user_search.is_empty() {
            return None;
        }

        match self {
            LookupKind::Name => {
                let attrib = ctx.server.name_attrib.as_deref()?;
                let name = read_attribute(session, ctx, attrib).await?.into_iter().next()?;
                ldap_debug!(ctx.flags.debug, "Name is '{}'", name);
                Some(LookupValue::Name(name))
            }
            LookupKind::Email => {
                let attrib = ctx.server.email_attrib.as_deref()?;
                let email = read_attribute(session, ctx, attrib).await?.into_iter().next()?;
                ldap_debug!(ctx.flags.debug, "Email is '{}'", email);
                Some(LookupValue::Email(email))
            }
            LookupKind::AdminGroup => check_admin_group(session, ctx).await,
            LookupKind::Credentials { password } => validate_credentials(session, ctx, password).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LookupKind::Name => "name",
            LookupKind::Email => "email",
            LookupKind::AdminGroup => "admin group",
            LookupKind::Credentials { .. } => "credentials",
        }
    }
}

/// Read one attribute of the user's entry. `None` when the entry or the
/// attribute is missing.
async fn read_attribute(
    session: &mut dyn DirectorySession,
    ctx: &LookupContext<'_>,
    attrib: &str,
) -> Option<Vec<String>> {
    let attrib = attrib.to_lowercase();

    let entries = match session
        .search(ctx.dn, Scope::Base, "(objectclass=*)", &[attrib.as_str()])
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            ldap_debug!(ctx.flags.debug, "Reading '{}' of '{}' failed: {}", attrib, ctx.dn, e);
            return None;
        }
    };

    let entry = entries.into_iter().next()?;
    ldap_debug!(ctx.flags.debug, "Read of '{}' successful", attrib);

    entry
        .values(&attrib)
        .filter(|values| !values.is_empty())
        .map(<[String]>::to_vec)
}

async fn check_admin_group(
    session: &mut dyn DirectorySession,
    ctx: &LookupContext<'_>,
) -> Option<LookupValue> {
    let admin_group_dn = ctx.server.admin_group_dn.as_deref()?;
    let member_attrib = ctx.server.group_member_attrib.as_deref()?;

    let groups = read_attribute(session, ctx, member_attrib).await?;

    if groups.iter().any(|group| group.eq_ignore_ascii_case(admin_group_dn)) {
        ldap_debug!(ctx.flags.debug, "Admin group found in user object");
        Some(LookupValue::AdminGroup)
    } else {
        ldap_debug!(ctx.flags.debug, "Admin group not found in user object");
        None
    }
}

async fn validate_credentials(
    session: &mut dyn DirectorySession,
    ctx: &LookupContext<'_>,
    password: &str,
) -> Option<LookupValue> {
    bind(session, Some(ctx.dn), Some(password), ctx.flags).await.ok()?;

    let Some(filter) = ctx.server.filter.as_deref() else {
        ldap_debug!(ctx.flags.debug, "Successful authenticated bind with no filter");
        return Some(LookupValue::Credentials);
    };

    let search_base = ctx.server.filter_base_dn.as_deref().unwrap_or(ctx.base_dn);
    let user_clause = match ctx.server.filter_user_attr.as_deref() {
        Some(attr) => format!("{}={}", attr, ldap_escape(ctx.username)),
        None => ctx.user_search.to_string(),
    };
    let filter = format!("(&({}){})", user_clause, parenthesize(filter));

    match session.search(search_base, Scope::Subtree, &filter, &["1.1"]).await {
        Ok(entries) if !entries.is_empty() => {
            ldap_debug!(ctx.flags.debug, "Found entry with filter '{}'", filter);
            Some(LookupValue::Credentials)
        }
        Ok(_) => {
            ldap_debug!(ctx.flags.debug, "No entry under '{}' matches '{}'", search_base, filter);
            None
        }
        Err(e) => {
            ldap_debug!(ctx.flags.debug, "Filter search '{}' failed: {}", filter, e);
            None
        }
    }
}

fn parenthesize(filter: &str) -> String {
    if filter.starts_with('(') {
        filter.to_string()
    } else {
        format!("({})", filter)
    }
}
