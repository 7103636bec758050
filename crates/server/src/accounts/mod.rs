//! User accounts.
//!
//! The login flow talks to accounts only through [`CredentialStore`]. The
//! shipped implementation is [`JsonCredentialStore`], a salted-hash JSON file.

pub mod json_store;

pub use json_store::{default_accounts_path, JsonCredentialStore};

use terminal::{User, UserOptions};
use thiserror::Error;

/// Errors from credential store operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Registration under a username that is already taken.
    #[error("username {username} is already registered")]
    AlreadyExists { username: String },

    /// Unknown username or wrong password. The two are not distinguished.
    #[error("user not found or password invalid")]
    NotFound,

    /// The backing storage could not be read or written.
    #[error("credential storage failed: {0:#}")]
    Storage(anyhow::Error),
}

/// Account registration and password verification.
pub trait CredentialStore: Send + Sync {
    /// Creates an account with empty options.
    fn register(&self, username: &str, password: &str) -> Result<User, AccountError>;

    /// Checks a password and returns the account's user.
    fn authenticate(&self, username: &str, password: &str) -> Result<User, AccountError>;

    /// Returns the stored options of an account.
    fn get_options(&self, username: &str) -> Result<UserOptions, AccountError>;
}
