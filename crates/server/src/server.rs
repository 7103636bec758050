//! TCP front end: accepts connections and walks each through login and its shell.
//!
//! Every accepted socket gets its own task running
//! negotiation → login → shell registration → shell loop → removal.
//! Shutdown cancels the accept loop and every connection task; shells are
//! removed from the directory on the way out either way.

use std::sync::Arc;

use anyhow::{Context, Result};
use terminal::{SessionOptions, TerminalSession};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounts::CredentialStore;
use crate::config::Config;
use crate::directory::{DirectoryOptions, SessionDirectory};
use crate::login::{self, LoginError, LoginOptions};
use crate::shell::{ShellExit, ShellOptions};

/// Written to connected clients when the server stops.
const SHUTDOWN_NOTICE: &str = "Server shutting down.";

/// The whirlnet server.
pub struct WhirlServer {
    config: Config,
    directory: Arc<SessionDirectory>,
    accounts: Arc<dyn CredentialStore>,
    shutdown_token: CancellationToken,
    tasks: TaskTracker,
}

impl WhirlServer {
    /// Creates a server. Nothing is bound until [`bind`](Self::bind).
    pub fn new(config: Config, accounts: Arc<dyn CredentialStore>) -> Self {
        let directory = Arc::new(SessionDirectory::new(DirectoryOptions {
            shell: ShellOptions {
                inbox_capacity: config.shell.inbox_capacity,
            },
        }));

        Self {
            config,
            directory,
            accounts,
            shutdown_token: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry of active shells.
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Token cancelled when the server shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(addr = %listener.local_addr()?, "Listening for telnet connections");
        Ok(listener)
    }

    /// Accepts connections until shutdown, then waits for connection tasks to finish.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Accept loop received shutdown signal");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(peer = %addr, "Accepted connection");
                        let server = Arc::clone(self);
                        self.tasks.spawn(async move { server.handle_connection(stream).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        self.tasks.close();
        self.tasks.wait().await;
        info!("All connections closed");
        Ok(())
    }

    /// Stops accepting, stops every shell, and ends every connection.
    pub async fn shutdown(&self) {
        info!(active_shells = self.directory.count().await, "Shutting down server");
        self.directory.stop_all().await;
        self.shutdown_token.cancel();
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            rows: self.config.terminal.default_rows,
            columns: self.config.terminal.default_columns,
            peer: None,
        }
    }

    fn login_options(&self) -> LoginOptions {
        LoginOptions {
            motd: self.config.server.motd.clone(),
            max_attempts: self.config.accounts.max_attempts,
        }
    }

    async fn handle_connection(&self, stream: TcpStream) {
        let session = Arc::new(TerminalSession::from_tcp(stream, self.session_options()));
        info!(peer = %session.peer(), "Client connected");

        let mut registered = None;
        tokio::select! {
            _ = self.shutdown_token.cancelled() => {
                let _ = session.newline();
                let _ = session.write(SHUTDOWN_NOTICE);
                let _ = session.newline();
            }
            result = self.serve_session(&session, &mut registered) => match result {
                Ok(exit) => debug!(peer = %session.peer(), exit = ?exit, "Session finished"),
                Err(e) => debug!(peer = %session.peer(), error = %format!("{e:#}"), "Session ended early"),
            },
        }

        if let Some(id) = registered {
            self.directory.remove(&id).await;
        }
        session.shutdown().await;
        info!(peer = %session.peer(), "Client disconnected");
    }

    async fn serve_session(
        &self,
        session: &Arc<TerminalSession>,
        registered: &mut Option<Uuid>,
    ) -> Result<ShellExit> {
        if self.config.server.telnet_negotiation {
            session.negotiate()?;
        }

        match login::login(session, self.accounts.as_ref(), &self.login_options()).await {
            Ok(_) => {}
            Err(LoginError::TooManyAttempts) => {
                info!(peer = %session.peer(), "Closing connection after failed logins");
                return Ok(ShellExit::Exited);
            }
            Err(LoginError::Account(e)) => {
                error!(peer = %session.peer(), error = %e, "Login aborted by account storage failure");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }

        let shell = self.directory.create_shell(Arc::clone(session)).await?;
        *registered = Some(shell.id());
        Ok(shell.run().await)
    }
}

impl std::fmt::Debug for WhirlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhirlServer")
            .field("bind", &self.config.server.bind)
            .field("shutting_down", &self.shutdown_token.is_cancelled())
            .finish_non_exhaustive()
    }
}
