//! Fallback identity values used when the directory is not asked

use roombook_core::config::AuthConfig;
use roombook_core::types::AccessLevel;

/// Level and email for users the directory has no opinion on
pub trait DefaultIdentity: Send + Sync {
    fn default_level(&self, username: &str) -> AccessLevel;

    fn default_email(&self, username: &str) -> String;
}

/// Defaults taken from the `[auth]` configuration section
#[derive(Debug, Clone, Default)]
pub struct StaticDefaults {
    admins: Vec<String>,
    mail_domain: Option<String>,
    mail_username_suffix: String,
}

impl StaticDefaults {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            admins: config.admins.clone(),
            mail_domain: config.mail_domain.clone().filter(|d| !d.is_empty()),
            mail_username_suffix: config.mail_username_suffix.clone(),
        }
    }
}

impl DefaultIdentity for StaticDefaults {
    fn default_level(&self, username: &str) -> AccessLevel {
        if username.is_empty() {
            return AccessLevel::None;
        }

        if self.admins.iter().any(|admin| admin.eq_ignore_ascii_case(username)) {
            AccessLevel::Admin
        } else {
            AccessLevel::User
        }
    }

    fn default_email(&self, username: &str) -> String {
        match &self.mail_domain {
            Some(domain) if !username.is_empty() => {
                format!("{}{}@{}", username, self.mail_username_suffix, domain)
            }
            _ => String::new(),
        }
    }
}
