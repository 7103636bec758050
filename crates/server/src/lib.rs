//! # whirlnet Server Library
//!
//! This crate provides the whirlnet server: a multi-user telnet shell where
//! logged-in users run commands, message each other and broadcast.
//!
//! ## Overview
//!
//! - **Accounts**: salted password hashes in a JSON file
//! - **Login**: keyed login/signup menu with bounded retries
//! - **Shell**: per-connection command loop with an inbox for messages
//! - **Directory**: registry of active shells, indexed by id and username
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WhirlServer                          │
//! │         accept loop, one task per connection                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────┐  │
//! │  │    Login     │──▶│    Shell     │◀──│   Directory    │  │
//! │  │   screens    │   │ loop + inbox │   │ id / username  │  │
//! │  └──────┬───────┘   └──────┬───────┘   └───────▲────────┘  │
//! │         │                  │                   │           │
//! │  ┌──────▼───────┐   ┌──────▼───────┐           │           │
//! │  │ Credential   │   │   Commands   │───────────┘           │
//! │  │    Store     │   │ send, users… │                       │
//! │  └──────────────┘   └──────────────┘                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  terminal::TerminalSession                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use server::{Config, JsonCredentialStore, WhirlServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let store = JsonCredentialStore::open(&config.accounts.path)?;
//!
//!     let server = Arc::new(WhirlServer::new(config, Arc::new(store)));
//!     let listener = server.bind().await?;
//!     server.serve(listener).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`accounts`]: Credential store interface and JSON implementation
//! - [`login`]: Login and signup screens
//! - [`shell`]: Commands, tokenizer and the shell loop
//! - [`directory`]: Registry of active shells
//! - [`server`]: TCP listener and connection lifecycle

pub mod accounts;
pub mod config;
pub mod directory;
pub mod login;
pub mod server;
pub mod shell;

// Re-export the terminal crate for convenience
pub use terminal;

pub use accounts::{AccountError, CredentialStore, JsonCredentialStore};
pub use config::{Config, ConfigError};
pub use directory::{DirectoryError, DirectoryOptions, SessionDirectory};
pub use login::{LoginError, LoginOptions};
pub use server::WhirlServer;
pub use shell::{Command, CommandTable, ParseError, Shell, ShellExit, ShellOptions, ShellState};
