//! Error types for direktor-core

use thiserror::Error;

use direktor_exec::ExecError;

/// Errors surfaced by a task run
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Transport-level connect/authentication/channel failure
    #[error(transparent)]
    Connection(#[from] ExecError),

    /// Remote command exited with a nonzero code
    #[error("command `{command}` exited with non-zero code {status}")]
    Command {
        /// The shell instruction that failed
        command: String,
        /// Its exit status
        status: i32,
    },

    /// A handler command reported failure
    #[error("handler failed: {0}")]
    Callback(String),
}
