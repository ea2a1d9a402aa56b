//! direktor-core: ordered remote command execution
//!
//! Implements the per-host `Task` state machine (connect, run ordered command
//! phases, optional error hook, disconnect) and the `Session` coordinator that
//! fans tasks out concurrently across a fleet, on top of the `direktor-exec`
//! transport seam.

pub mod command;
pub mod error;
pub mod session;
pub mod state;
pub mod task;

pub use command::{Command, CommandHandler, CommandSet};
pub use error::TaskError;
pub use session::{Session, StepFn};
pub use state::TaskState;
pub use task::Task;
