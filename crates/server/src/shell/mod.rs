//! The interactive shell: command interface, standard commands, tokenizer and loop.

pub mod command;
pub mod commands;
pub mod runtime;
pub mod tokenize;

pub use command::{Command, CommandTable};
pub use commands::{BroadcastMessage, Echo, Exit, Help, ListUsers, SendMessage};
pub use runtime::{Shell, ShellExit, ShellOptions, ShellState};
pub use tokenize::{tokenize, ParseError};
