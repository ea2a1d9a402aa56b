//! Task run state machine types

use std::fmt;

/// States a task run moves through
///
/// Every run ends in `Done` through `Disconnecting`, whether it succeeded or
/// failed; `Erroring` is entered on any failure and is a no-op when no error
/// hook is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Connecting,
    RunningBefore,
    RunningCommands,
    RunningAfter,
    Erroring,
    Disconnecting,
    Done,
}

impl TaskState {
    /// Check whether moving to `to` is a valid transition
    #[must_use]
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::{
            Connecting, Disconnecting, Done, Erroring, Idle, RunningAfter, RunningBefore,
            RunningCommands,
        };

        matches!(
            (self, to),
            (Idle, Connecting)
                | (Connecting, RunningBefore | Erroring)
                | (RunningBefore, RunningCommands | Erroring)
                | (RunningCommands, RunningAfter | Erroring)
                | (RunningAfter, Disconnecting | Erroring)
                | (Erroring, Disconnecting)
                | (Disconnecting, Done)
        )
    }

    /// Whether this state ends the run
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Connecting => "connecting",
            TaskState::RunningBefore => "running-before",
            TaskState::RunningCommands => "running-commands",
            TaskState::RunningAfter => "running-after",
            TaskState::Erroring => "erroring",
            TaskState::Disconnecting => "disconnecting",
            TaskState::Done => "done",
        };
        f.write_str(name)
    }
}
