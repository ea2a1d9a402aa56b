//! `Task`: per-host execution
//!
//! A task owns one connection for the duration of a `perform` call and drives
//! the run state machine: connect, run the `before`/`commands`/`after` phases
//! in strict series, run the error hook if anything failed, disconnect. The
//! connection is opened at most once and closed exactly once per run, and
//! `perform` returns exactly once with either success or the original
//! triggering error.

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use direktor_exec::traits::{Connection, Connector};
use direktor_exec::{ConnectOptions, ExecError, SshConnector};

use crate::command::{Command, CommandSet};
use crate::error::TaskError;
use crate::state::TaskState;

/// Unit of work targeting one remote host
///
/// Stateless between `perform` calls; the connection and the derived logging
/// span live only for the duration of one run, so the same task can be
/// performed again from scratch.
pub struct Task {
    options: ConnectOptions,
    before: CommandSet,
    commands: CommandSet,
    after: CommandSet,
    error: CommandSet,
    connector: Arc<dyn Connector>,
    redact_secrets: bool,
}

impl Task {
    /// Create a task with no phases, connecting over SSH
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            before: CommandSet::new(),
            commands: CommandSet::new(),
            after: CommandSet::new(),
            error: CommandSet::new(),
            connector: Arc::new(SshConnector::new()),
            redact_secrets: false,
        }
    }

    /// Set the `before` phase
    #[must_use]
    pub fn before(mut self, commands: impl Into<CommandSet>) -> Self {
        self.before = commands.into();
        self
    }

    /// Set the main `commands` phase
    #[must_use]
    pub fn commands(mut self, commands: impl Into<CommandSet>) -> Self {
        self.commands = commands.into();
        self
    }

    /// Set the `after` phase
    #[must_use]
    pub fn after(mut self, commands: impl Into<CommandSet>) -> Self {
        self.after = commands.into();
        self
    }

    /// Set the error hook, run when any prior phase fails
    #[must_use]
    pub fn on_error(mut self, commands: impl Into<CommandSet>) -> Self {
        self.error = commands.into();
        self
    }

    /// Replace the transport used to open connections
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Hide credentials in the rendered audit dump (off by default)
    #[must_use]
    pub fn redact_secrets(mut self, redact: bool) -> Self {
        self.redact_secrets = redact;
        self
    }

    /// Connection options for this task
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Target identity, `user@host:port`
    #[must_use]
    pub fn target(&self) -> String {
        self.options.target()
    }

    /// New task sharing this task's phase definitions, aimed at a different
    /// host
    ///
    /// Phases are shared cheaply; connection options are replaced wholesale,
    /// so one template task can be replayed against many hosts.
    #[must_use]
    pub fn clone_to(&self, options: ConnectOptions) -> Task {
        Task {
            options,
            before: self.before.clone(),
            commands: self.commands.clone(),
            after: self.after.clone(),
            error: self.error.clone(),
            connector: Arc::clone(&self.connector),
            redact_secrets: self.redact_secrets,
        }
    }

    /// Run this task to completion
    ///
    /// Derives a child logging span labeled with the target identity from
    /// `parent`. Returns `Ok(())` on full success, or the original triggering
    /// error: a failing item aborts its phase and skips all later phases, the
    /// error hook (if configured) runs with that error as context, and the
    /// connection is closed unconditionally before returning.
    pub async fn perform(&self, parent: &Span) -> Result<(), TaskError> {
        let span = info_span!(parent: parent, "task", target = %self.target());
        self.run().instrument(span).await
    }

    async fn run(&self) -> Result<(), TaskError> {
        let mut state = TaskState::Idle;
        advance(&mut state, TaskState::Connecting);

        let (mut connection, mut result) = match self.connector.connect(&self.options).await {
            Ok(connection) => (Some(connection), Ok(())),
            Err(err) => {
                error!(error = %err, "connection failed");
                (None, Err(TaskError::from(err)))
            }
        };

        if result.is_ok() {
            result = self.run_phases(&mut state, &mut connection).await;
        }

        if let Err(trigger) = &result {
            advance(&mut state, TaskState::Erroring);
            if !self.error.is_empty() {
                let trigger = trigger.clone();
                if let Err(hook_err) = self
                    .run_set(&self.error, &mut connection, Some(&trigger))
                    .await
                {
                    // The original error is what gets reported.
                    warn!(error = %hook_err, "error hook failed");
                }
            }
        }

        advance(&mut state, TaskState::Disconnecting);
        if let Some(mut connection) = connection.take() {
            if let Err(err) = connection.close().await {
                warn!(error = %err, "failed to close connection");
            }
        }
        advance(&mut state, TaskState::Done);

        result
    }

    /// Run `before`, `commands`, `after` in strict series
    async fn run_phases(
        &self,
        state: &mut TaskState,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), TaskError> {
        let phases = [
            (TaskState::RunningBefore, &self.before),
            (TaskState::RunningCommands, &self.commands),
            (TaskState::RunningAfter, &self.after),
        ];

        for (phase, set) in phases {
            advance(state, phase);
            self.run_set(set, connection, None).await?;
        }

        Ok(())
    }

    async fn run_set(
        &self,
        set: &CommandSet,
        connection: &mut Option<Box<dyn Connection>>,
        error: Option<&TaskError>,
    ) -> Result<(), TaskError> {
        for command in set.iter() {
            self.run_command(command, connection, error).await?;
        }
        Ok(())
    }

    async fn run_command(
        &self,
        command: &Command,
        connection: &mut Option<Box<dyn Connection>>,
        error: Option<&TaskError>,
    ) -> Result<(), TaskError> {
        match command {
            Command::Handler(handler) => {
                debug!("invoking handler command");
                handler.run(self, error).await.map_err(TaskError::Callback)
            }
            Command::Shell(instruction) => {
                let Some(connection) = connection.as_deref_mut() else {
                    // Reachable only from the error hook after a failed connect.
                    return Err(TaskError::Connection(ExecError::NotConnected));
                };

                info!(command = %instruction, "executing command");

                let output = connection.exec(instruction).await?;

                if output.success() {
                    debug!(command = %instruction, "command exited with zero code");
                    Ok(())
                } else {
                    let err = TaskError::Command {
                        command: instruction.clone(),
                        status: output.status,
                    };
                    error!(error = %err, "command failed");
                    Err(err)
                }
            }
        }
    }
}

/// Log and apply a state transition
fn advance(state: &mut TaskState, to: TaskState) {
    debug_assert!(
        state.can_transition_to(to),
        "invalid transition {state} -> {to}"
    );
    debug!(from = %state, to = %to, "state transition");
    *state = to;
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("target", &self.target())
            .field("before", &self.before)
            .field("commands", &self.commands)
            .field("after", &self.after)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Task {
    /// Human-oriented audit dump
    ///
    /// Renders the configured password and private key in clear text unless
    /// `redact_secrets` is set; intended for debugging, so keep the output
    /// out of anything persisted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();

        lines.push(format!("Host: {}", self.options.host));

        if let Some(password) = &self.options.password {
            if self.redact_secrets {
                lines.push("Password: <redacted>".to_string());
            } else {
                lines.push(format!("Password: {password}"));
            }
        }

        if let Some(key) = &self.options.private_key {
            if self.redact_secrets {
                lines.push("Private key: <redacted>".to_string());
            } else {
                lines.push(format!("Private key: {key}"));
            }
        }

        let phases = [
            ("BEFORE", &self.before),
            ("COMMANDS", &self.commands),
            ("AFTER", &self.after),
            ("ERROR", &self.error),
        ];

        for (header, set) in phases {
            lines.push(header.to_string());
            for command in set.iter() {
                lines.push(format!("    {command}"));
            }
        }

        f.write_str(&lines.join("\n"))
    }
}
