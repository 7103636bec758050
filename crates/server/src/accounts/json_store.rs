//! File-backed credential store.
//!
//! Accounts are kept in memory and written to a versioned JSON document after
//! every registration. Passwords are stored as hex SHA-256 digests of a
//! per-account random salt followed by the password.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use terminal::{User, UserOptions};

use super::{AccountError, CredentialStore};

/// Current on-disk format version.
const STORE_VERSION: u32 = 1;

/// Length of the random salt in bytes.
const SALT_LENGTH: usize = 16;

/// One stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRecord {
    username: String,
    /// Hex-encoded salt.
    salt: String,
    /// Hex-encoded `SHA-256(salt || password)`.
    password_hash: String,
    #[serde(default)]
    options: UserOptions,
}

impl AccountRecord {
    fn new(username: &str, password: &str) -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            username: username.to_string(),
            salt: hex::encode(salt),
            password_hash: hash_password(&salt, password),
            options: UserOptions::new(),
        }
    }

    fn verify(&self, password: &str) -> bool {
        let Ok(salt) = hex::decode(&self.salt) else {
            tracing::warn!(username = %self.username, "Stored salt is not valid hex");
            return false;
        };
        constant_time_eq(
            hash_password(&salt, password).as_bytes(),
            self.password_hash.as_bytes(),
        )
    }

    fn to_user(&self) -> User {
        User::with_options(self.username.clone(), self.options.clone())
    }
}

/// Serialized form of the store.
#[derive(Debug, Serialize, Deserialize)]
struct AccountStoreData {
    /// Format version, for future migrations.
    version: u32,
    users: Vec<AccountRecord>,
}

fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Credential store persisted as JSON.
///
/// Lookups go through an in-memory `RwLock<HashMap>`; the file is rewritten
/// atomically (temp file, then rename) whenever an account is added.
pub struct JsonCredentialStore {
    path: PathBuf,
    accounts: RwLock<HashMap<String, AccountRecord>>,
}

impl JsonCredentialStore {
    /// Creates an empty store that persists to `path`.
    ///
    /// Does not read the file; see [`open`](Self::open).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a store for `path` and loads it. A missing file gives an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replaces the in-memory accounts with the file's contents.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Account file not found, starting empty");
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read accounts: {}", self.path.display()))?;
        let data: AccountStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse accounts: {}", self.path.display()))?;

        if data.version != STORE_VERSION {
            anyhow::bail!(
                "Unsupported account file version {} in {}",
                data.version,
                self.path.display()
            );
        }

        let mut accounts = self.write();
        accounts.clear();
        for record in data.users {
            accounts.insert(record.username.clone(), record);
        }

        tracing::info!(count = accounts.len(), path = %self.path.display(), "Loaded accounts");
        Ok(())
    }

    fn save_locked(&self, accounts: &HashMap<String, AccountRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create accounts directory: {}", parent.display())
            })?;
        }

        let mut users: Vec<_> = accounts.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        let data = AccountStoreData {
            version: STORE_VERSION,
            users,
        };
        let contents = serde_json::to_string_pretty(&data).context("Failed to serialize accounts")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)
            .with_context(|| format!("Failed to write temp accounts: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp accounts {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!(count = accounts.len(), path = %self.path.display(), "Saved accounts");
        Ok(())
    }

    /// Writes all accounts to disk.
    pub fn save(&self) -> Result<()> {
        let accounts = self.read();
        self.save_locked(&accounts)
    }
}

impl CredentialStore for JsonCredentialStore {
    fn register(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let mut accounts = self.write();
        if accounts.contains_key(username) {
            return Err(AccountError::AlreadyExists {
                username: username.to_string(),
            });
        }

        let record = AccountRecord::new(username, password);
        let user = record.to_user();
        accounts.insert(username.to_string(), record);

        if let Err(e) = self.save_locked(&accounts) {
            accounts.remove(username);
            return Err(AccountError::Storage(e));
        }

        tracing::info!(username = %username, "Registered account");
        Ok(user)
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let accounts = self.read();
        match accounts.get(username) {
            Some(record) if record.verify(password) => Ok(record.to_user()),
            _ => {
                tracing::debug!(username = %username, "Authentication failed");
                Err(AccountError::NotFound)
            }
        }
    }

    fn get_options(&self, username: &str) -> Result<UserOptions, AccountError> {
        self.read()
            .get(username)
            .map(|record| record.options.clone())
            .ok_or(AccountError::NotFound)
    }
}

impl std::fmt::Debug for JsonCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCredentialStore")
            .field("path", &self.path)
            .field("accounts", &self.len())
            .finish()
    }
}

/// Default account file: `<data dir>/whirlnet/users.json`.
pub fn default_accounts_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("whirlnet")
        .join("users.json")
}
