//! The per-connection shell loop and its inbox.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use terminal::{TerminalError, TerminalSession, User};
use uuid::Uuid;

use super::command::CommandTable;
use super::tokenize::tokenize;

const WELCOME: &str = "welcome to whirlshell! type `help' for available commands.";
const QUOTING_HINT: &str = "use \"quotes\" for arguments with spaces.";
const PROMPT: &str = "wsh>";

/// Lifecycle of a [`Shell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Built but `run` has not started yet.
    Created,
    /// Reading and dispatching commands.
    Running,
    /// Finished or asked to stop. Terminal.
    Stopped,
}

/// Why [`Shell::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    /// The session was closed by a command (`exit`).
    Exited,
    /// [`Shell::stop`] was called.
    Stopped,
    /// The connection went away.
    Disconnected,
}

/// Options applied to every shell.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Maximum queued messages. `None` leaves the inbox unbounded; when full
    /// the oldest message is dropped.
    pub inbox_capacity: Option<usize>,
}

#[derive(Debug, Default)]
struct Inbox {
    queue: VecDeque<String>,
    capacity: Option<usize>,
    dropped: u64,
    overflowing: bool,
}

impl Inbox {
    /// Queues a message, returning true when this starts a run of drops.
    fn push(&mut self, message: String) -> bool {
        let mut first_drop = false;
        if let Some(capacity) = self.capacity {
            while self.queue.len() >= capacity {
                self.queue.pop_front();
                self.dropped += 1;
                first_drop = !self.overflowing;
                self.overflowing = true;
            }
        }
        self.queue.push_back(message);
        first_drop
    }

    fn take(&mut self) -> VecDeque<String> {
        self.overflowing = false;
        std::mem::take(&mut self.queue)
    }
}

/// An interactive command loop bound to one authenticated terminal session.
///
/// Other shells reach this one only through [`Shell::send_message`], which
/// queues text into the inbox. The loop displays queued messages after each
/// command; a shell that is not running displays them immediately.
pub struct Shell {
    id: Uuid,
    user: User,
    terminal: Arc<TerminalSession>,
    commands: CommandTable,
    inbox: Mutex<Inbox>,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl Shell {
    /// Builds a shell. `commands` receives a weak handle to the shell being
    /// built so that commands like `help` can refer back to it.
    pub fn new<F>(
        terminal: Arc<TerminalSession>,
        user: User,
        options: ShellOptions,
        commands: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Weak<Shell>) -> CommandTable,
    {
        Arc::new_cyclic(|weak| Self {
            id: Uuid::new_v4(),
            user,
            terminal,
            commands: commands(weak),
            inbox: Mutex::new(Inbox {
                capacity: options.inbox_capacity,
                ..Inbox::default()
            }),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Session id, assigned at construction.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// User the shell was created for.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Username of [`user`](Self::user).
    pub fn username(&self) -> &str {
        &self.user.username
    }

    /// Session the shell reads from and writes to.
    pub fn terminal(&self) -> &Arc<TerminalSession> {
        &self.terminal
    }

    /// Dispatch table, in registration order.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Names of the registered commands.
    pub fn command_names(&self) -> Vec<String> {
        self.commands.names()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShellState {
        if self.stopped.load(Ordering::SeqCst) {
            ShellState::Stopped
        } else if self.running.load(Ordering::SeqCst) {
            ShellState::Running
        } else {
            ShellState::Created
        }
    }

    /// Whether the read-dispatch loop is active.
    pub fn is_running(&self) -> bool {
        self.state() == ShellState::Running
    }

    /// Messages queued but not yet displayed.
    pub fn pending_messages(&self) -> Vec<String> {
        self.inbox().queue.iter().cloned().collect()
    }

    /// Messages discarded because the inbox was full.
    pub fn dropped_messages(&self) -> u64 {
        self.inbox().dropped
    }

    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the loop until the session closes, the connection drops, or
    /// [`stop`](Self::stop) is called. Leaves the shell stopped.
    pub async fn run(&self) -> ShellExit {
        if self.stopped.load(Ordering::SeqCst) {
            return ShellExit::Stopped;
        }

        tracing::info!(shell_id = %self.id, username = %self.user.username, "Shell started");

        let exit = match self.run_loop().await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::debug!(shell_id = %self.id, error = %e, "Shell lost its connection");
                ShellExit::Disconnected
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);

        tracing::info!(
            shell_id = %self.id,
            username = %self.user.username,
            exit = ?exit,
            "Shell finished"
        );
        exit
    }

    async fn run_loop(&self) -> Result<ShellExit, TerminalError> {
        self.terminal.write(WELCOME)?;
        self.terminal.newline()?;
        self.terminal.write(QUOTING_HINT)?;
        self.terminal.newline()?;

        self.running.store(true, Ordering::SeqCst);

        while !self.stopped.load(Ordering::SeqCst) {
            let line = self.terminal.prompt_text(PROMPT).await?;
            self.execute(&line).await?;

            if self.terminal.is_closed() {
                return Ok(ShellExit::Exited);
            }
            self.display_inbox()?;
        }
        Ok(ShellExit::Stopped)
    }

    /// Parses and dispatches one command line.
    ///
    /// Parse failures and unknown commands are reported to the session.
    pub async fn execute(&self, line: &str) -> Result<(), TerminalError> {
        let tokens = match tokenize(line) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.terminal.write(&format!("Error parsing command: {e}"))?;
                return self.terminal.newline();
            }
        };

        let Some((name, args)) = tokens.split_first() else {
            return Ok(());
        };
        let name = name.to_lowercase();

        match self.commands.get(&name) {
            Some(command) => {
                tracing::trace!(shell_id = %self.id, command = %name, "Dispatching command");
                command.execute(args, &self.terminal).await
            }
            None => {
                self.terminal.write(&format!("Unknown command: {name}"))?;
                self.terminal.newline()
            }
        }
    }

    /// Queues a message for display.
    ///
    /// A shell that is not running displays it right away. Messages that
    /// cannot be displayed because the session is gone are dropped.
    pub fn send_message(&self, message: impl Into<String>) {
        let first_drop = self.inbox().push(message.into());
        if first_drop {
            tracing::warn!(shell_id = %self.id, "Inbox full, dropping oldest messages");
        }

        if !self.is_running() {
            if let Err(e) = self.display_inbox() {
                tracing::debug!(shell_id = %self.id, error = %e, "Dropped message for closed session");
            }
        }
    }

    fn display_inbox(&self) -> Result<(), TerminalError> {
        let messages = self.inbox().take();
        for message in messages {
            self.terminal.newline()?;
            self.terminal.write(&format!("Message received: {message}"))?;
            self.terminal.newline()?;
        }
        Ok(())
    }

    /// Asks the loop to end after its current cycle. An in-flight read is
    /// not interrupted.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn mark_running_for_test(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("id", &self.id)
            .field("username", &self.user.username)
            .field("state", &self.state())
            .field("commands", &self.commands)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::commands::{Echo, Exit, Help};
    use crate::test_support::authenticated_session;
    use terminal::LoopbackClient;

    fn basic_shell(name: &str, options: ShellOptions) -> (Arc<Shell>, LoopbackClient) {
        let (session, client) = authenticated_session(name);
        let shell = Shell::new(Arc::new(session), User::new(name), options, |weak| {
            CommandTable::new()
                .with(Arc::new(Echo))
                .with(Arc::new(Exit))
                .with(Arc::new(Help::new(weak.clone())))
        });
        (shell, client)
    }

    fn spawn_run(shell: &Arc<Shell>) -> tokio::task::JoinHandle<ShellExit> {
        let shell = Arc::clone(shell);
        tokio::spawn(async move { shell.run().await })
    }

    #[tokio::test]
    async fn test_new_shell_is_created() {
        let (shell, _client) = basic_shell("alice", ShellOptions::default());
        assert_eq!(shell.state(), ShellState::Created);
        assert_eq!(shell.username(), "alice");
        assert_eq!(shell.command_names(), vec!["echo", "exit", "help"]);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (a, _ca) = basic_shell("alice", ShellOptions::default());
        let (b, _cb) = basic_shell("alice", ShellOptions::default());
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_run_welcome_echo_exit() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        let handle = spawn_run(&shell);

        let banner = client.read_until("wsh> ").await;
        assert!(banner.starts_with(&format!("{WELCOME}\r\n{QUOTING_HINT}\r\n")));
        assert_eq!(shell.state(), ShellState::Running);

        client.send("echo hello world\r").await.unwrap();
        let out = client.read_until("wsh> ").await;
        assert!(out.contains("\r\nhello world"));

        client.send("EXIT\r").await.unwrap();
        let out = client.read_to_end().await;
        assert!(out.ends_with("\r\nGoodbye!\r\n"));

        assert_eq!(handle.await.unwrap(), ShellExit::Exited);
        assert_eq!(shell.state(), ShellState::Stopped);
    }

    #[tokio::test]
    async fn test_unknown_command_is_reported() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        shell.execute("Frobnicate now").await.unwrap();
        shell.terminal().await_drain().await.unwrap();
        assert_eq!(client.read_available().await, "Unknown command: frobnicate\r\n");
    }

    #[tokio::test]
    async fn test_parse_error_is_reported_without_dispatch() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        shell.execute("exit \"unterminated").await.unwrap();
        shell.terminal().await_drain().await.unwrap();

        assert_eq!(
            client.read_available().await,
            "Error parsing command: no closing quotation (\")\r\n"
        );
        assert!(!shell.terminal().is_closed());
    }

    #[tokio::test]
    async fn test_blank_line_does_nothing() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        shell.execute("   ").await.unwrap();
        shell.terminal().await_drain().await.unwrap();
        assert_eq!(client.read_available().await, "");
    }

    #[tokio::test]
    async fn test_run_after_stop_returns_immediately() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        shell.stop();
        assert_eq!(shell.run().await, ShellExit::Stopped);
        assert_eq!(client.read_available().await, "");
    }

    #[tokio::test]
    async fn test_stop_ends_loop_after_current_cycle() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        let handle = spawn_run(&shell);
        client.read_until("wsh> ").await;

        shell.stop();
        assert_eq!(shell.state(), ShellState::Stopped);
        client.send("echo last\r").await.unwrap();

        assert_eq!(handle.await.unwrap(), ShellExit::Stopped);
        assert!(client.read_available().await.contains("last"));
    }

    #[tokio::test]
    async fn test_disconnect_ends_loop() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        let handle = spawn_run(&shell);
        client.read_until("wsh> ").await;

        client.disconnect();
        assert_eq!(handle.await.unwrap(), ShellExit::Disconnected);
        assert_eq!(shell.state(), ShellState::Stopped);
    }

    #[tokio::test]
    async fn test_queued_message_shown_after_next_command() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        let handle = spawn_run(&shell);
        client.read_until("wsh> ").await;

        shell.send_message("Message from bob: hi");
        assert_eq!(shell.pending_messages(), vec!["Message from bob: hi"]);
        // Held until the pending prompt read completes.
        assert_eq!(client.read_available().await, "");

        client.send("echo x\r").await.unwrap();
        let out = client.read_until("wsh> ").await;
        assert!(out.contains("\r\nx\r\nMessage received: Message from bob: hi\r\n"));
        assert!(shell.pending_messages().is_empty());

        client.send("exit\r").await.unwrap();
        assert_eq!(handle.await.unwrap(), ShellExit::Exited);
    }

    #[tokio::test]
    async fn test_send_message_to_idle_shell_displays_immediately() {
        let (shell, mut client) = basic_shell("alice", ShellOptions::default());
        shell.send_message("hello");

        assert!(shell.pending_messages().is_empty());
        shell.terminal().await_drain().await.unwrap();
        assert_eq!(client.read_available().await, "\r\nMessage received: hello\r\n");
    }

    #[tokio::test]
    async fn test_send_message_to_closed_shell_is_dropped() {
        let (shell, _client) = basic_shell("alice", ShellOptions::default());
        shell.terminal().close();
        shell.send_message("lost");
        assert!(shell.pending_messages().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_inbox_drops_oldest() {
        let (shell, _client) = basic_shell(
            "alice",
            ShellOptions {
                inbox_capacity: Some(2),
            },
        );
        shell.mark_running_for_test();

        for msg in ["one", "two", "three", "four"] {
            shell.send_message(msg);
        }
        assert_eq!(shell.pending_messages(), vec!["three", "four"]);
        assert_eq!(shell.dropped_messages(), 2);
    }

    #[tokio::test]
    async fn test_unbounded_inbox_keeps_everything() {
        let (shell, _client) = basic_shell("alice", ShellOptions::default());
        shell.mark_running_for_test();
        for i in 0..100 {
            shell.send_message(format!("m{i}"));
        }
        assert_eq!(shell.pending_messages().len(), 100);
        assert_eq!(shell.dropped_messages(), 0);
    }

    #[test]
    fn test_inbox_reports_first_drop_of_burst() {
        let mut inbox = Inbox {
            capacity: Some(1),
            ..Inbox::default()
        };
        assert!(!inbox.push("a".into()));
        assert!(inbox.push("b".into()));
        assert!(!inbox.push("c".into()));
        inbox.take();
        assert!(!inbox.push("d".into()));
        assert!(inbox.push("e".into()));
        assert_eq!(inbox.dropped, 3);
    }
}
