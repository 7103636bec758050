//! The command interface and the per-shell dispatch table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use terminal::{TerminalError, TerminalSession};

/// A shell command.
///
/// Commands receive the arguments after the command name and the session of
/// the user who typed them. Usage problems are reported to that session;
/// only connection failures are returned as errors.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name the command is invoked by.
    fn name(&self) -> &str;

    /// One-line description shown by `help`.
    fn help_text(&self) -> &str;

    /// Runs the command.
    async fn execute(&self, args: &[String], session: &TerminalSession)
        -> Result<(), TerminalError>;
}

/// Case-insensitive name → command table that remembers registration order.
///
/// Built once when a shell is created and never mutated afterwards.
#[derive(Clone, Default)]
pub struct CommandTable {
    order: Vec<String>,
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command under its lower-cased name.
    ///
    /// Registering a name twice replaces the command but keeps its original
    /// position.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        let key = command.name().to_lowercase();
        if self.commands.insert(key.clone(), command).is_none() {
            self.order.push(key);
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, command: Arc<dyn Command>) -> Self {
        self.register(command);
        self
    }

    /// Looks a command up, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(&name.to_lowercase())
    }

    /// Commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.order.iter().filter_map(|name| self.commands.get(name))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Command for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn help_text(&self) -> &str {
            self.1
        }

        async fn execute(
            &self,
            _args: &[String],
            _session: &TerminalSession,
        ) -> Result<(), TerminalError> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        let table = CommandTable::new().with(Arc::new(Named("Echo", "")));
        assert!(table.get("echo").is_some());
        assert!(table.get("ECHO").is_some());
        assert!(table.get("ech").is_none());
    }

    #[test]
    fn test_registration_order_kept() {
        let table = CommandTable::new()
            .with(Arc::new(Named("zeta", "")))
            .with(Arc::new(Named("alpha", "")))
            .with(Arc::new(Named("mid", "")));
        assert_eq!(table.names(), vec!["zeta", "alpha", "mid"]);
        let names: Vec<_> = table.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_reregistration_replaces_in_place() {
        let table = CommandTable::new()
            .with(Arc::new(Named("a", "old")))
            .with(Arc::new(Named("b", "")))
            .with(Arc::new(Named("A", "new")));
        assert_eq!(table.len(), 2);
        assert_eq!(table.names(), vec!["a", "b"]);
        assert_eq!(table.get("a").map(|c| c.help_text()), Some("new"));
    }
}
