//! User types

use serde::{Deserialize, Serialize};

/// Authorization level of a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Not logged in
    #[default]
    None,
    User,
    Admin,
}

impl AccessLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            AccessLevel::None => 0,
            AccessLevel::User => 1,
            AccessLevel::Admin => 2,
        }
    }
}

impl From<AccessLevel> for u8 {
    fn from(level: AccessLevel) -> Self {
        level.as_u8()
    }
}

/// Identity handed back to the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Falls back to the username
    pub display_name: String,
    /// Empty when unknown
    pub email: String,
    pub level: AccessLevel,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            display_name: username.clone(),
            username,
            email: String::new(),
            level: AccessLevel::None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.level == AccessLevel::Admin
    }

    pub fn is_authenticated(&self) -> bool {
        self.level > AccessLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("jdoe");
        assert_eq!(user.display_name, "jdoe");
        assert!(user.email.is_empty());
        assert_eq!(user.level.as_u8(), 0);
        assert!(!user.is_authenticated());
    }

    #[test]
    fn test_level_ordering() {
        assert!(AccessLevel::Admin > AccessLevel::User);
        assert!(AccessLevel::User > AccessLevel::None);
        assert_eq!(u8::from(AccessLevel::Admin), 2);
    }

    #[test]
    fn test_serialization() {
        let mut user = User::new("jdoe");
        user.level = AccessLevel::Admin;

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["level"], "admin");
        assert_eq!(json["display_name"], "jdoe");
    }
}
