//! Configuration for Roombook

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ENV_PREFIX;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoombookConfig {
    #[serde(default)]
    pub ldap: LdapSettings,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RoombookConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from `path` if given, otherwise from the environment.
    /// A `.env` file in the working directory is honoured either way.
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        let _ = dotenvy::dotenv();

        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::from_env()),
        }
    }

    /// Build a configuration from `ROOMBOOK_*` variables.
    ///
    /// Per-server LDAP values may list one entry per server separated by `;`
    /// (commas are part of DNs).
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with variables read through `var`
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let env = EnvReader { var };
        let mut config = Self::default();
        let ldap = &mut config.ldap;

        let text = |v: &str| Some(v.to_string());
        env.list("LDAP_HOST", text, &mut ldap.host);
        env.list("LDAP_PORT", |v| v.parse::<u16>().ok(), &mut ldap.port);
        env.list("LDAP_BASE_DN", text, &mut ldap.base_dn);
        env.list("LDAP_USER_ATTRIB", text, &mut ldap.user_attrib);
        env.list("LDAP_DN_SEARCH_ATTRIB", text, &mut ldap.dn_search_attrib);
        env.list("LDAP_DN_SEARCH_DN", text, &mut ldap.dn_search_dn);
        env.list("LDAP_DN_SEARCH_PASSWORD", text, &mut ldap.dn_search_password);
        env.list("LDAP_FILTER", text, &mut ldap.filter);
        env.list("LDAP_GROUP_MEMBER_ATTRIB", text, &mut ldap.group_member_attrib);
        env.list("LDAP_ADMIN_GROUP_DN", text, &mut ldap.admin_group_dn);
        env.list("LDAP_V3", parse_bool, &mut ldap.v3);
        env.list("LDAP_TLS", parse_bool, &mut ldap.tls);
        env.list("LDAP_EMAIL_ATTRIB", text, &mut ldap.email_attrib);
        env.list("LDAP_NAME_ATTRIB", text, &mut ldap.name_attrib);
        env.list("LDAP_DISABLE_REFERRALS", parse_bool, &mut ldap.disable_referrals);
        env.list("LDAP_DEREF", parse_deref, &mut ldap.deref);
        env.list("LDAP_FILTER_BASE_DN", text, &mut ldap.filter_base_dn);
        env.list("LDAP_FILTER_USER_ATTR", text, &mut ldap.filter_user_attr);

        if let Some(debug) = env.flag("LDAP_DEBUG") {
            ldap.debug = debug;
        }
        if let Some(enabled) = env.flag("LDAP_GET_USER_EMAIL") {
            ldap.get_user_email = enabled;
        }
        if let Some(suppress) = env.flag("LDAP_SUPPRESS_INVALID_CREDENTIALS") {
            ldap.suppress_invalid_credentials = suppress;
        }

        if let Some(domain) = env.get("MAIL_DOMAIN") {
            config.auth.mail_domain = Some(domain);
        }
        if let Some(suffix) = env.get("MAIL_USERNAME_SUFFIX") {
            config.auth.mail_username_suffix = suffix;
        }
        if let Some(admins) = env.get("ADMINS") {
            config.auth.admins = admins
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
        }

        if let Some(level) = env.get("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env.get("LOG_FORMAT") {
            match format.as_str() {
                "json" => config.logging.format = LogFormat::Json,
                "text" => config.logging.format = LogFormat::Text,
                other => warn!("Ignoring unknown log format: {}", other),
            }
        }

        config
    }
}

struct EnvReader<F> {
    var: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.var)(&format!("{ENV_PREFIX}{name}"))
    }

    fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| parse_bool(&v))
    }

    /// Set `target` from a `;`-separated variable. An unparsable entry leaves
    /// `target` untouched.
    fn list<T>(
        &self,
        name: &str,
        parse: impl Fn(&str) -> Option<T>,
        target: &mut Option<ConfigValue<T>>,
    ) {
        let Some(raw) = self.get(name) else { return };

        let mut values = Vec::new();
        for part in raw.split(';').map(str::trim) {
            match parse(part) {
                Some(value) => values.push(value),
                None => {
                    warn!("Ignoring invalid value for {}{}: {:?}", ENV_PREFIX, name, part);
                    return;
                }
            }
        }

        *target = if values.len() == 1 {
            values.pop().map(ConfigValue::One)
        } else {
            Some(ConfigValue::Many(values))
        };
    }
}

fn parse_deref(value: &str) -> Option<DerefPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "never" => Some(DerefPolicy::Never),
        "searching" => Some(DerefPolicy::Searching),
        "finding" => Some(DerefPolicy::Finding),
        "always" => Some(DerefPolicy::Always),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A setting given either once for every directory server or once per server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> ConfigValue<T> {
    /// Number of entries when given as a list
    pub fn list_len(&self) -> Option<usize> {
        match self {
            ConfigValue::One(_) => None,
            ConfigValue::Many(values) => Some(values.len()),
        }
    }

    /// Value in effect for the server at `idx`; scalars apply to every server
    pub fn get(&self, idx: usize) -> Option<&T> {
        match self {
            ConfigValue::One(value) => Some(value),
            ConfigValue::Many(values) => values.get(idx),
        }
    }
}

impl<T> From<T> for ConfigValue<T> {
    fn from(value: T) -> Self {
        ConfigValue::One(value)
    }
}

/// Alias dereferencing policy applied to directory searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerefPolicy {
    Never,
    Searching,
    Finding,
    Always,
}

/// LDAP/Active Directory configuration section
///
/// Every per-server key takes a single value or a list. Lists must all have
/// the same length; single values are repeated for every server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapSettings {
    /// Directory host name or `ldap://`/`ldaps://` URL
    #[serde(default)]
    pub host: Option<ConfigValue<String>>,

    #[serde(default)]
    pub port: Option<ConfigValue<u16>>,

    /// Base DN for user entries
    #[serde(default)]
    pub base_dn: Option<ConfigValue<String>>,

    /// Attribute used to build the user DN directly
    #[serde(default = "default_user_attrib")]
    pub user_attrib: Option<ConfigValue<String>>,

    /// When set, the user DN is found by searching on this attribute
    #[serde(default)]
    pub dn_search_attrib: Option<ConfigValue<String>>,

    #[serde(default)]
    pub dn_search_dn: Option<ConfigValue<String>>,

    #[serde(default)]
    pub dn_search_password: Option<ConfigValue<String>>,

    /// Extra filter a user must match to log in
    #[serde(default)]
    pub filter: Option<ConfigValue<String>>,

    #[serde(default = "default_group_member_attrib")]
    pub group_member_attrib: Option<ConfigValue<String>>,

    /// Members of this group are administrators
    #[serde(default)]
    pub admin_group_dn: Option<ConfigValue<String>>,

    #[serde(default = "default_true")]
    pub v3: Option<ConfigValue<bool>>,

    /// Negotiate STARTTLS after connecting
    #[serde(default)]
    pub tls: Option<ConfigValue<bool>>,

    #[serde(default = "default_email_attrib")]
    pub email_attrib: Option<ConfigValue<String>>,

    #[serde(default = "default_name_attrib")]
    pub name_attrib: Option<ConfigValue<String>>,

    /// Needed for searches against Active Directory
    #[serde(default)]
    pub disable_referrals: Option<ConfigValue<bool>>,

    #[serde(default)]
    pub deref: Option<ConfigValue<DerefPolicy>>,

    /// Base for the login filter search, defaults to the base DN
    #[serde(default)]
    pub filter_base_dn: Option<ConfigValue<String>>,

    /// Attribute of the filter entries holding the username
    #[serde(default)]
    pub filter_user_attr: Option<ConfigValue<String>>,

    /// Do not log "invalid credentials" bind failures as warnings
    #[serde(default)]
    pub suppress_invalid_credentials: bool,

    /// Emit LDAP debug lines
    #[serde(default)]
    pub debug: bool,

    /// Look email addresses up in the directory
    #[serde(default)]
    pub get_user_email: bool,
}

fn default_user_attrib() -> Option<ConfigValue<String>> {
    Some(ConfigValue::One("uid".to_string()))
}

fn default_group_member_attrib() -> Option<ConfigValue<String>> {
    Some(ConfigValue::One("memberof".to_string()))
}

fn default_email_attrib() -> Option<ConfigValue<String>> {
    Some(ConfigValue::One("mail".to_string()))
}

fn default_name_attrib() -> Option<ConfigValue<String>> {
    Some(ConfigValue::One("cn".to_string()))
}

fn default_true() -> Option<ConfigValue<bool>> {
    Some(ConfigValue::One(true))
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            base_dn: None,
            user_attrib: default_user_attrib(),
            dn_search_attrib: None,
            dn_search_dn: None,
            dn_search_password: None,
            filter: None,
            group_member_attrib: default_group_member_attrib(),
            admin_group_dn: None,
            v3: default_true(),
            tls: None,
            email_attrib: default_email_attrib(),
            name_attrib: default_name_attrib(),
            disable_referrals: None,
            deref: None,
            filter_base_dn: None,
            filter_user_attr: None,
            suppress_invalid_credentials: false,
            debug: false,
            get_user_email: false,
        }
    }
}

/// Fallback identity settings used when the directory is not asked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Usernames granted administrator level
    #[serde(default)]
    pub admins: Vec<String>,

    /// Domain appended to usernames to form email addresses
    #[serde(default)]
    pub mail_domain: Option<String>,

    /// Inserted between the username and `@domain`
    #[serde(default)]
    pub mail_username_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
