//! The standard command set.
//!
//! `echo`, `exit` and `help` only touch the caller's own session. `send`,
//! `broadcast` and `users` hold a handle to the [`SessionDirectory`] and act on
//! other shells through it, re-resolving targets each time they run.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use terminal::{TerminalError, TerminalSession};

use super::command::Command;
use super::runtime::Shell;
use crate::directory::SessionDirectory;

/// Name used when a session somehow has no authenticated user.
const UNKNOWN_SENDER: &str = "unknown";

fn sender_name(session: &TerminalSession) -> &str {
    session
        .user()
        .map(|u| u.username.as_str())
        .unwrap_or(UNKNOWN_SENDER)
}

/// `echo <args...>`: writes the arguments joined by single spaces.
#[derive(Debug, Default)]
pub struct Echo;

#[async_trait]
impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn help_text(&self) -> &str {
        "Echo the given arguments"
    }

    async fn execute(&self, args: &[String], session: &TerminalSession) -> Result<(), TerminalError> {
        session.newline()?;
        session.write(&args.join(" "))
    }
}

/// `exit`: says goodbye, waits for it to be delivered, then closes the session.
#[derive(Debug, Default)]
pub struct Exit;

#[async_trait]
impl Command for Exit {
    fn name(&self) -> &str {
        "exit"
    }

    fn help_text(&self) -> &str {
        "Exit the shell"
    }

    async fn execute(&self, _args: &[String], session: &TerminalSession) -> Result<(), TerminalError> {
        session.newline()?;
        session.write("Goodbye!")?;
        session.newline()?;
        session.await_drain().await?;
        session.close();
        Ok(())
    }
}

/// `help`: lists the commands of the owning shell in registration order.
#[derive(Debug)]
pub struct Help {
    shell: Weak<Shell>,
}

impl Help {
    /// Creates the command for the shell behind `shell`.
    pub fn new(shell: Weak<Shell>) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl Command for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn help_text(&self) -> &str {
        "Display this help message"
    }

    async fn execute(&self, _args: &[String], session: &TerminalSession) -> Result<(), TerminalError> {
        session.newline()?;
        session.write_title("Available Commands")?;
        session.newline()?;

        let Some(shell) = self.shell.upgrade() else {
            return Ok(());
        };
        for command in shell.commands().iter() {
            session.write(&format!("  {}: {}", command.name(), command.help_text()))?;
            session.newline()?;
        }
        Ok(())
    }
}

/// `send <username> <message>`: queues a direct message for one user.
pub struct SendMessage {
    directory: Arc<SessionDirectory>,
}

impl SendMessage {
    /// Creates the command over `directory`.
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Command for SendMessage {
    fn name(&self) -> &str {
        "send"
    }

    fn help_text(&self) -> &str {
        "Send a message to a specific user"
    }

    async fn execute(&self, args: &[String], session: &TerminalSession) -> Result<(), TerminalError> {
        let [target, message, ..] = args else {
            session.newline()?;
            return session.write("Usage: send <username> <message>");
        };

        let recipient = self
            .directory
            .find_first(|shell| shell.username() == target.as_str())
            .await;

        session.newline()?;
        match recipient {
            Some(shell) => {
                let sender = sender_name(session);
                shell.send_message(format!("Message from {sender}: {message}"));
                tracing::debug!(from = %sender, to = %target, "Direct message queued");
                session.write(&format!("Message sent to {target}"))
            }
            None => session.write(&format!("User {target} not found")),
        }
    }
}

/// `broadcast <message>`: queues a message for every active shell, the sender's included.
pub struct BroadcastMessage {
    directory: Arc<SessionDirectory>,
}

impl BroadcastMessage {
    /// Creates the command over `directory`.
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Command for BroadcastMessage {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn help_text(&self) -> &str {
        "Broadcast a message to all users"
    }

    async fn execute(&self, args: &[String], session: &TerminalSession) -> Result<(), TerminalError> {
        let Some(message) = args.first() else {
            session.newline()?;
            return session.write("Usage: broadcast <message>");
        };

        let sender = sender_name(session);
        let delivered = self
            .directory
            .broadcast(&format!("Broadcast from {sender}: {message}"))
            .await;
        tracing::debug!(from = %sender, recipients = delivered, "Broadcast queued");

        session.newline()?;
        session.write("Message broadcasted to all users")
    }
}

/// `users`: lists the usernames of all active shells, sorted.
pub struct ListUsers {
    directory: Arc<SessionDirectory>,
}

impl ListUsers {
    /// Creates the command over `directory`.
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Command for ListUsers {
    fn name(&self) -> &str {
        "users"
    }

    fn help_text(&self) -> &str {
        "List all active users"
    }

    async fn execute(&self, _args: &[String], session: &TerminalSession) -> Result<(), TerminalError> {
        let mut users = self.directory.usernames().await;
        users.sort();

        session.newline()?;
        session.write_title("Active Users")?;
        session.newline()?;
        for username in users {
            session.write(&format!("- {username}"))?;
            session.newline()?;
        }
        Ok(())
    }
}
