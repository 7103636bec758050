//! Authenticated user snapshot.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-user option map as stored by the credential store.
pub type UserOptions = BTreeMap<String, serde_json::Value>;

/// An authenticated user.
///
/// This is an immutable snapshot handed out by the credential store at login
/// time. Later changes to the stored record are not reflected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique username.
    pub username: String,
    /// Free-form per-user options.
    #[serde(default)]
    pub options: UserOptions,
}

impl User {
    /// Creates a user with an empty option map.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            options: UserOptions::new(),
        }
    }

    /// Creates a user with the given options.
    pub fn with_options(username: impl Into<String>, options: UserOptions) -> Self {
        Self {
            username: username.into(),
            options,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_username() {
        assert_eq!(User::new("alice").to_string(), "alice");
    }

    #[test]
    fn test_deserialize_without_options() {
        let user: User = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(user, User::new("bob"));
    }

    #[test]
    fn test_with_options() {
        let mut options = UserOptions::new();
        options.insert("color".to_string(), serde_json::json!("blue"));
        let user = User::with_options("carol", options);
        assert_eq!(user.options["color"], "blue");
    }
}
