//! `Session`: concurrent fan-out across a fleet
//!
//! A session holds an ordered collection of tasks sharing one base logging
//! span and starts all of them concurrently, with no cap on how many remote
//! connections are open at once. Each task reports its own outcome through
//! the optional step callback; the session's return value carries the first
//! error encountered.
//!
//! Known asymmetry, preserved deliberately: when a task fails, `execute`
//! returns that error immediately while sibling tasks keep running detached
//! to their own completion. They still trigger the step callback, but their
//! outcomes are otherwise unobserved by the caller, so a large fleet can keep
//! holding connections after `execute` has returned.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{Span, error, info, info_span};

use crate::error::TaskError;
use crate::task::Task;

/// Per-task completion observer, invoked once per task in completion order
pub type StepFn = Arc<dyn Fn(&Task, Option<&TaskError>) + Send + Sync>;

/// Coordinator running a fixed collection of tasks concurrently
pub struct Session {
    tasks: Vec<Arc<Task>>,
    span: Span,
}

impl Session {
    /// Create a session with its own base logging span
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self::with_span(tasks, info_span!("session"))
    }

    /// Create a session logging under a caller-provided span
    pub fn with_span(tasks: impl IntoIterator<Item = Task>, span: Span) -> Self {
        Self {
            tasks: tasks.into_iter().map(Arc::new).collect(),
            span,
        }
    }

    /// The owned tasks, in list order
    #[must_use]
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    /// Number of owned tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the session owns no tasks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task concurrently
    ///
    /// Returns `Ok(())` once all tasks have succeeded, or the first error
    /// encountered. May be invoked again; every invocation re-runs every task
    /// from scratch.
    pub async fn execute(&self) -> Result<(), TaskError> {
        self.fan_out(None).await
    }

    /// Run every task concurrently, reporting each completion via `on_step`
    ///
    /// `on_step` is invoked with `(task, error-or-none)` exactly once per
    /// task, in completion order. It keeps firing for tasks that finish after
    /// an error has already been returned.
    pub async fn execute_with(&self, on_step: StepFn) -> Result<(), TaskError> {
        self.fan_out(Some(on_step)).await
    }

    async fn fan_out(&self, on_step: Option<StepFn>) -> Result<(), TaskError> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        for task in &self.tasks {
            let task = Arc::clone(task);
            let tx = tx.clone();
            let on_step = on_step.clone();
            let span = self.span.clone();

            tokio::spawn(async move {
                let result = task.perform(&span).await;
                if let Some(on_step) = &on_step {
                    on_step(&task, result.as_ref().err());
                }
                // The receiver is gone once an earlier task has failed; this
                // task's outcome is then unobserved.
                let _ = tx.send((task, result));
            });
        }
        drop(tx);

        let mut remaining = self.tasks.len();
        while remaining > 0 {
            let Some((task, result)) = rx.recv().await else {
                break;
            };
            remaining -= 1;

            match result {
                Ok(()) => info!(target = %task.target(), "task completed"),
                Err(err) => {
                    error!(target = %task.target(), error = %err, "task failed");
                    return Err(err);
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Session {
    /// Concatenated audit dump of every task, for dry-run/audit output
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.tasks.iter().map(ToString::to_string).collect();
        writeln!(f, "{}", rendered.join("\n\n===\n\n"))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
