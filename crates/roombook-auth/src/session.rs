//! Login form handling
//!
//! [`SessionManager::process`] turns a submitted login form into the next
//! step for the web layer: show the form, redirect after logon or logoff.
//! Rendering and cookie handling stay with the caller.

use std::sync::Arc;

use roombook_core::types::User;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AuthBackend;

/// Form action posted by the login and logoff buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormAction {
    QueryName,
    SetName,
}

/// Fields posted by the login form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub action: Option<FormAction>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub returl: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginError {
    UnknownUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Not a login form submission
    NoAction,
    ShowLoginForm {
        target_url: String,
        returl: Option<String>,
        error: Option<LoginError>,
    },
    LoggedOn { user: User, redirect: String },
    LoggedOff { redirect: String },
}

pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    pub async fn process(&self, form: &LoginForm) -> LoginOutcome {
        match form.action {
            None => LoginOutcome::NoAction,
            Some(FormAction::QueryName) => LoginOutcome::ShowLoginForm {
                target_url: form.target_url.clone(),
                returl: form.returl.clone(),
                error: None,
            },
            Some(FormAction::SetName) => self.set_name(form).await,
        }
    }

    async fn set_name(&self, form: &LoginForm) -> LoginOutcome {
        let username = form.username.as_deref().unwrap_or_default();
        if username.is_empty() {
            return LoginOutcome::LoggedOff {
                redirect: form.target_url.clone(),
            };
        }

        let password = form.password.as_deref().unwrap_or_default();
        let Some(valid_username) = self.backend.validate_user(username, password).await else {
            warn!("Failed login for user {}", username);
            return LoginOutcome::ShowLoginForm {
                target_url: form.target_url.clone(),
                returl: form.returl.clone(),
                error: Some(LoginError::UnknownUser),
            };
        };

        info!("User {} logged on", valid_username);
        let user = self.backend.get_user(&valid_username).await;

        LoginOutcome::LoggedOn {
            user,
            redirect: redirect_url(&form.target_url, form.returl.as_deref()),
        }
    }
}

/// Append the URL-encoded return URL to `target`
fn redirect_url(target: &str, returl: Option<&str>) -> String {
    match returl {
        Some(returl) if !returl.is_empty() => {
            let separator = if target.contains('?') { '&' } else { '?' };
            format!("{}{}{}", target, separator, urlencoding::encode(returl))
        }
        _ => target.to_string(),
    }
}
