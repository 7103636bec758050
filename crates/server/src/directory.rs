//! Registry of active shells.
//!
//! The directory is the only way one connection affects another: commands
//! like `send` and `broadcast` resolve their targets here at the moment they
//! run. Shells are indexed by id and by username; a second login under the
//! same username takes over the username entry while the first shell keeps
//! running and stays reachable by id.

use std::collections::HashMap;
use std::sync::Arc;

use terminal::TerminalSession;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::shell::{
    BroadcastMessage, CommandTable, Echo, Exit, Help, ListUsers, SendMessage, Shell, ShellOptions,
};

/// Errors from directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The session has no authenticated user attached.
    #[error("session from {peer} is not authenticated")]
    Unauthenticated { peer: String },
}

/// Options for shells created by the directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryOptions {
    pub shell: ShellOptions,
}

#[derive(Default)]
struct Indices {
    shells: HashMap<Uuid, Arc<Shell>>,
    order: Vec<Uuid>,
    by_username: HashMap<String, Uuid>,
}

impl Indices {
    fn snapshot(&self) -> Vec<Arc<Shell>> {
        self.order
            .iter()
            .filter_map(|id| self.shells.get(id))
            .cloned()
            .collect()
    }
}

/// Thread-safe registry of active shells.
///
/// Both indices live behind one lock. The lock is never held while calling
/// into a shell; operations that touch shells work on a snapshot.
pub struct SessionDirectory {
    options: DirectoryOptions,
    indices: RwLock<Indices>,
}

impl SessionDirectory {
    /// Creates an empty directory.
    pub fn new(options: DirectoryOptions) -> Self {
        Self {
            options,
            indices: RwLock::new(Indices::default()),
        }
    }

    /// Builds a shell for an authenticated session and registers it.
    ///
    /// The shell gets the standard command set, registered in the order
    /// `echo`, `exit`, `help`, `send`, `broadcast`, `users`.
    pub async fn create_shell(
        self: &Arc<Self>,
        terminal: Arc<TerminalSession>,
    ) -> Result<Arc<Shell>, DirectoryError> {
        let Some(user) = terminal.user().cloned() else {
            return Err(DirectoryError::Unauthenticated {
                peer: terminal.peer().to_string(),
            });
        };

        let shell = Shell::new(terminal, user, self.options.shell.clone(), |weak| {
            CommandTable::new()
                .with(Arc::new(Echo))
                .with(Arc::new(Exit))
                .with(Arc::new(Help::new(weak.clone())))
                .with(Arc::new(SendMessage::new(Arc::clone(self))))
                .with(Arc::new(BroadcastMessage::new(Arc::clone(self))))
                .with(Arc::new(ListUsers::new(Arc::clone(self))))
        });

        let id = shell.id();
        let username = shell.username().to_string();
        {
            let mut indices = self.indices.write().await;
            indices.shells.insert(id, Arc::clone(&shell));
            indices.order.push(id);
            if let Some(previous) = indices.by_username.insert(username.clone(), id) {
                tracing::info!(
                    username = %username,
                    previous_shell_id = %previous,
                    "Username now points at a newer shell"
                );
            }
        }

        tracing::info!(
            shell_id = %id,
            username = %username,
            peer = %shell.terminal().peer(),
            "Created shell"
        );
        Ok(shell)
    }

    /// Looks a shell up by id.
    pub async fn get_by_id(&self, id: &Uuid) -> Option<Arc<Shell>> {
        self.indices.read().await.shells.get(id).cloned()
    }

    /// Looks up the most recent shell registered for `username`.
    pub async fn get_by_username(&self, username: &str) -> Option<Arc<Shell>> {
        let indices = self.indices.read().await;
        let id = indices.by_username.get(username)?;
        indices.shells.get(id).cloned()
    }

    /// Returns the first active shell, in registration order, matching `predicate`.
    pub async fn find_first<P>(&self, predicate: P) -> Option<Arc<Shell>>
    where
        P: Fn(&Shell) -> bool,
    {
        let indices = self.indices.read().await;
        indices
            .order
            .iter()
            .filter_map(|id| indices.shells.get(id))
            .find(|shell| predicate(shell))
            .cloned()
    }

    /// Removes a shell. The username entry is only dropped while it still
    /// points at this shell.
    pub async fn remove(&self, id: &Uuid) -> Option<Arc<Shell>> {
        let removed = {
            let mut indices = self.indices.write().await;
            let shell = indices.shells.remove(id)?;
            indices.order.retain(|other| other != id);
            if indices.by_username.get(shell.username()) == Some(id) {
                indices.by_username.remove(shell.username());
            }
            shell
        };

        tracing::info!(
            shell_id = %id,
            username = %removed.username(),
            "Removed shell"
        );
        Some(removed)
    }

    /// Ids of all active shells in registration order.
    pub async fn list_ids(&self) -> Vec<Uuid> {
        self.indices.read().await.order.clone()
    }

    /// Usernames of all active shells, duplicates included.
    pub async fn usernames(&self) -> Vec<String> {
        let indices = self.indices.read().await;
        indices
            .order
            .iter()
            .filter_map(|id| indices.shells.get(id))
            .map(|shell| shell.username().to_string())
            .collect()
    }

    /// Number of active shells.
    pub async fn count(&self) -> usize {
        self.indices.read().await.shells.len()
    }

    /// Queues `message` for every active shell. Returns how many shells it was sent to.
    pub async fn broadcast(&self, message: &str) -> usize {
        let shells = self.indices.read().await.snapshot();
        for shell in &shells {
            shell.send_message(message);
        }
        shells.len()
    }

    /// Asks every active shell to stop.
    pub async fn stop_all(&self) {
        let shells = self.indices.read().await.snapshot();
        tracing::info!(count = shells.len(), "Stopping all shells");
        for shell in shells {
            shell.stop();
        }
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(DirectoryOptions::default())
    }
}

impl std::fmt::Debug for SessionDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDirectory")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
