use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::Span;

use direktor_core::{Command, CommandHandler, Session, Task, TaskError};
use direktor_exec::error::ExecError;
use direktor_exec::options::ConnectOptions;
use direktor_exec::result::CommandOutput;
use direktor_exec::traits::{Connection, Connector};

// Scripted transport double: commands listed in `exit_codes` exit with that
// code, everything else exits 0. Executed commands and open/close counts are
// shared with the test through Arcs.
#[derive(Default)]
struct ScriptedConnector {
    refuse: bool,
    exit_codes: HashMap<String, i32>,
    log: Arc<Mutex<Vec<String>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    fn failing(command: &str, status: i32) -> Self {
        Self {
            exit_codes: HashMap::from([(command.to_string(), status)]),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, ExecError> {
        if self.refuse {
            return Err(ExecError::ConnectionFailed(format!(
                "{} unreachable",
                options.host
            )));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            exit_codes: self.exit_codes.clone(),
            log: Arc::clone(&self.log),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct ScriptedConnection {
    exit_codes: HashMap<String, i32>,
    log: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn exec(&mut self, cmd: &str) -> Result<CommandOutput, ExecError> {
        self.log.lock().unwrap().push(cmd.to_string());
        Ok(CommandOutput {
            status: self.exit_codes.get(cmd).copied().unwrap_or(0),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("direktor_core=debug")
        .try_init();
}

fn options(host: &str) -> ConnectOptions {
    ConnectOptions::new(host, "deploy").with_password("hunter2")
}

fn task_with(host: &str, connector: ScriptedConnector) -> Task {
    Task::new(options(host)).with_connector(Arc::new(connector))
}

#[tokio::test]
async fn successful_run_reports_no_error() {
    init_tracing();

    let connector = ScriptedConnector::default();
    let log = Arc::clone(&connector.log);
    let closed = Arc::clone(&connector.closed);

    let task = task_with("web-1", connector).commands(["echo hi"]);
    let result = task.perform(&Span::none()).await;

    assert!(result.is_ok());
    assert_eq!(*log.lock().unwrap(), ["echo hi"]);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_command_runs_error_hook_and_reports_original_error() {
    init_tracing();

    let connector = ScriptedConnector::failing("false", 1);
    let log = Arc::clone(&connector.log);
    let closed = Arc::clone(&connector.closed);

    let task = task_with("web-1", connector)
        .commands(["false"])
        .on_error(["echo cleanup"]);

    let err = task.perform(&Span::none()).await.unwrap_err();

    assert!(matches!(err, TaskError::Command { status: 1, .. }));
    assert!(err.to_string().contains("false"));
    assert!(err.to_string().contains('1'));
    assert_eq!(*log.lock().unwrap(), ["false", "echo cleanup"]);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_item_aborts_the_rest_of_its_phase() {
    let connector = ScriptedConnector::failing("b", 2);
    let log = Arc::clone(&connector.log);

    let task = task_with("web-1", connector).commands(["a", "b", "c"]);
    let err = task.perform(&Span::none()).await.unwrap_err();

    assert!(matches!(err, TaskError::Command { status: 2, .. }));
    assert_eq!(*log.lock().unwrap(), ["a", "b"]);
}

#[tokio::test]
async fn failing_before_skips_commands_and_after() {
    let connector = ScriptedConnector::failing("setup", 1);
    let log = Arc::clone(&connector.log);
    let closed = Arc::clone(&connector.closed);

    let task = task_with("web-1", connector)
        .before(["setup"])
        .commands(["main"])
        .after(["teardown"]);

    let result = task.perform(&Span::none()).await;

    assert!(result.is_err());
    assert_eq!(*log.lock().unwrap(), ["setup"]);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

// Handler recording the error context it was invoked with.
#[derive(Default)]
struct RecordingHandler {
    seen: Arc<Mutex<Option<String>>>,
    invoked: Arc<AtomicUsize>,
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    async fn run(&self, _task: &Task, error: Option<&TaskError>) -> Result<(), String> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = error.map(ToString::to_string);
        Ok(())
    }
}

#[tokio::test]
async fn connect_failure_skips_all_phases_but_runs_error_hook() {
    init_tracing();

    let connector = ScriptedConnector {
        refuse: true,
        ..ScriptedConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let opened = Arc::clone(&connector.opened);
    let closed = Arc::clone(&connector.closed);

    let hook = RecordingHandler::default();
    let seen = Arc::clone(&hook.seen);
    let invoked = Arc::clone(&hook.invoked);

    let task = task_with("web-1", connector)
        .before(["setup"])
        .commands(["main"])
        .on_error(Command::handler(hook));

    let err = task.perform(&Span::none()).await.unwrap_err();

    assert!(matches!(err, TaskError::Connection(_)));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    let seen = seen.lock().unwrap().clone();
    assert!(seen.unwrap().contains("unreachable"));
}

#[tokio::test]
async fn failing_error_hook_does_not_mask_the_original_error() {
    let mut connector = ScriptedConnector::failing("false", 1);
    connector.exit_codes.insert("cleanup".to_string(), 7);
    let log = Arc::clone(&connector.log);
    let closed = Arc::clone(&connector.closed);

    let task = task_with("web-1", connector)
        .commands(["false"])
        .on_error(["cleanup"]);

    let err = task.perform(&Span::none()).await.unwrap_err();

    assert!(err.to_string().contains("false"));
    assert!(!err.to_string().contains("cleanup"));
    assert_eq!(*log.lock().unwrap(), ["false", "cleanup"]);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

struct FailingHandler;

#[async_trait]
impl CommandHandler for FailingHandler {
    async fn run(&self, _task: &Task, _error: Option<&TaskError>) -> Result<(), String> {
        Err("disk is full".to_string())
    }
}

#[tokio::test]
async fn handler_failure_surfaces_as_callback_error() {
    let connector = ScriptedConnector::default();
    let closed = Arc::clone(&connector.closed);

    let task = task_with("web-1", connector).commands(Command::handler(FailingHandler));
    let err = task.perform(&Span::none()).await.unwrap_err();

    assert!(matches!(err, TaskError::Callback(_)));
    assert!(err.to_string().contains("disk is full"));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_phases_complete_immediately() {
    let connector = ScriptedConnector::default();
    let log = Arc::clone(&connector.log);
    let opened = Arc::clone(&connector.opened);
    let closed = Arc::clone(&connector.closed);

    let task = task_with("web-1", connector);
    let result = task.perform(&Span::none()).await;

    assert!(result.is_ok());
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_reports_every_task_and_overall_success() {
    init_tracing();

    let steps: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
    let steps_in_cb = Arc::clone(&steps);

    let tasks: Vec<Task> = (1..=3)
        .map(|i| task_with(&format!("web-{i}"), ScriptedConnector::default()).commands(["uptime"]))
        .collect();

    let session = Session::new(tasks);
    let result = session
        .execute_with(Arc::new(move |task, err| {
            steps_in_cb
                .lock()
                .unwrap()
                .push((task.target(), err.is_none()));
        }))
        .await;

    assert!(result.is_ok());

    let steps = steps.lock().unwrap();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|(_, ok)| *ok));
}

#[tokio::test]
async fn session_surfaces_first_error_and_lets_siblings_finish() {
    init_tracing();

    let steps: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
    let steps_in_cb = Arc::clone(&steps);

    let closed_counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::default()).collect();

    let tasks: Vec<Task> = (0..3)
        .map(|i| {
            let connector = if i == 1 {
                ScriptedConnector::failing("deploy.sh", 1)
            } else {
                ScriptedConnector::default()
            };
            let connector = ScriptedConnector {
                closed: Arc::clone(&closed_counts[i]),
                ..connector
            };
            task_with(&format!("web-{i}"), connector).commands(["deploy.sh"])
        })
        .collect();

    let session = Session::new(tasks);
    let err = session
        .execute_with(Arc::new(move |task, err| {
            steps_in_cb
                .lock()
                .unwrap()
                .push((task.target(), err.is_none()));
        }))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("deploy.sh"));

    // Stragglers keep running after execute has returned; wait for their
    // step callbacks.
    for _ in 0..200 {
        if steps.lock().unwrap().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let steps = steps.lock().unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps.iter().filter(|(_, ok)| *ok).count(), 2);
    assert_eq!(
        steps.iter().filter(|(target, ok)| !ok && target.contains("web-1")).count(),
        1
    );

    for closed in &closed_counts {
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn execute_can_be_invoked_again() {
    let connector = ScriptedConnector::default();
    let opened = Arc::clone(&connector.opened);

    let session = Session::new(vec![task_with("web-1", connector).commands(["uptime"])]);

    assert!(session.execute().await.is_ok());
    assert!(session.execute().await.is_ok());
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}
