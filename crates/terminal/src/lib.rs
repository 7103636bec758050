//! # whirlnet Terminal Library
//!
//! This crate provides the terminal interaction protocol used by the whirlnet
//! server: how a single client connection is read from and written to.
//!
//! ## Overview
//!
//! - **Line editing**: character-at-a-time prompts with backspace redraw
//! - **Secret input**: unechoed prompts for passwords
//! - **Keyed menus**: single-keypress option selection
//! - **Ordered output**: synchronous buffered writes, drain barrier, close
//! - **Telnet filtering**: strips `IAC` sequences, tracks window size (NAWS)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             TerminalSession             │  prompts, write, drain, close
//! ├────────────────────┬────────────────────┤
//! │     CharReader     │   Output (task)    │  UTF-8 decode │ ordered frames
//! ├────────────────────┤                    │
//! │    TelnetFilter    │                    │  IAC stripping, NAWS
//! ├────────────────────┴────────────────────┤
//! │        Transport (TCP / in-memory)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use terminal::{KeyedOption, SessionOptions, TerminalSession};
//!
//! # async fn demo(stream: tokio::net::TcpStream) -> terminal::Result<()> {
//! let session = TerminalSession::from_tcp(stream, SessionOptions::default());
//! session.write_title("welcome")?;
//!
//! let choice = session
//!     .prompt_choice(&[KeyedOption::new('l', "login"), KeyedOption::new('s', "signup")], true)
//!     .await?;
//! let name = session.prompt_line("name", true, Some(64)).await?;
//! let password = session.prompt_secret("password", 64).await?;
//!
//! session.write("bye")?;
//! session.await_drain().await?;
//! session.close();
//! # let _ = (choice, name, password);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`session`]: the terminal session and its prompts
//! - [`option`]: keyed menu options
//! - [`input`]: character decoding and terminal geometry
//! - [`telnet`]: telnet command filter
//! - [`style`]: ANSI styling
//! - [`loopback`]: in-memory client for tests and tooling
//! - [`user`]: authenticated user snapshot
//! - [`error`]: error types

pub mod error;
pub mod input;
pub mod loopback;
pub mod option;
mod output;
pub mod session;
pub mod style;
pub mod telnet;
pub mod user;

pub use error::{Result, TerminalError};
pub use input::Geometry;
pub use loopback::LoopbackClient;
pub use option::KeyedOption;
pub use session::{SessionOptions, TerminalSession, DEFAULT_COLUMNS, DEFAULT_ROWS, NEWLINE};
pub use user::{User, UserOptions};
