//! Command and phase types
//!
//! A phase is a `CommandSet`: an ordered sequence of commands run strictly in
//! order, where an empty set is a no-op. A command is either a shell
//! instruction forwarded verbatim to the remote host, or a handler invoked
//! locally for host-side inspection/branching without a remote round trip.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::task::Task;

/// Locally-invoked command
///
/// Handlers never touch the remote transport implicitly; they receive the
/// owning task and, when run from the error hook, the triggering error.
/// Returning `Err` fails the run with `TaskError::Callback`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, task: &Task, error: Option<&TaskError>) -> Result<(), String>;
}

/// One command of a phase
#[derive(Clone)]
pub enum Command {
    /// Shell instruction executed on the remote host
    Shell(String),
    /// Handler invoked locally
    Handler(Arc<dyn CommandHandler>),
}

impl Command {
    /// Create a shell command
    pub fn shell(instruction: impl Into<String>) -> Self {
        Command::Shell(instruction.into())
    }

    /// Create a handler command
    pub fn handler(handler: impl CommandHandler + 'static) -> Self {
        Command::Handler(Arc::new(handler))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Shell(instruction) => f.write_str(instruction),
            Command::Handler(_) => f.write_str("[handler]"),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Shell(instruction) => f.debug_tuple("Shell").field(instruction).finish(),
            Command::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl From<&str> for Command {
    fn from(instruction: &str) -> Self {
        Command::Shell(instruction.to_string())
    }
}

impl From<String> for Command {
    fn from(instruction: String) -> Self {
        Command::Shell(instruction)
    }
}

/// Ordered sequence of commands, run strictly in order
#[derive(Debug, Clone, Default)]
pub struct CommandSet(Vec<Command>);

impl CommandSet {
    /// Create an empty set (a no-op phase)
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Whether the set holds no commands
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Append a command
    pub fn push(&mut self, command: impl Into<Command>) {
        self.0.push(command.into());
    }

    /// Iterate the commands in order
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.0.iter()
    }
}

impl From<Command> for CommandSet {
    fn from(command: Command) -> Self {
        Self(vec![command])
    }
}

impl From<&str> for CommandSet {
    fn from(instruction: &str) -> Self {
        Self(vec![instruction.into()])
    }
}

impl From<String> for CommandSet {
    fn from(instruction: String) -> Self {
        Self(vec![instruction.into()])
    }
}

impl<T: Into<Command>> From<Vec<T>> for CommandSet {
    fn from(commands: Vec<T>) -> Self {
        Self(commands.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Command>, const N: usize> From<[T; N]> for CommandSet {
    fn from(commands: [T; N]) -> Self {
        Self(commands.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Command> for CommandSet {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn run(&self, _task: &Task, _error: Option<&TaskError>) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn single_instruction_becomes_one_element_set() {
        let set = CommandSet::from("echo hi");
        assert_eq!(set.len(), 1);
        assert!(!set.is_empty());
    }

    #[test]
    fn sequences_keep_their_order() {
        let set = CommandSet::from(["a", "b", "c"]);
        let rendered: Vec<String> = set.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a", "b", "c"]);
    }

    #[test]
    fn default_set_is_a_noop() {
        assert!(CommandSet::default().is_empty());
    }

    #[test]
    fn handlers_render_opaquely() {
        assert_eq!(Command::handler(Noop).to_string(), "[handler]");
        assert_eq!(Command::shell("uptime").to_string(), "uptime");
    }
}
