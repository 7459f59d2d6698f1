//! Runtime trait for the container backend
//!
//! The orchestrator and the dashboard only talk to the stack through
//! [`StackRuntime`]. The compose implementation lives in [`crate::compose`];
//! tests use [`crate::fake::FakeRuntime`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::ServiceKey;
use crate::snapshot::SnapshotMap;

/// Errors that can occur while driving the runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The tool itself could not be found or launched
    #[error("`{program}` is not available; is Docker installed and on PATH?")]
    Unavailable { program: String },

    #[error("`{command}` failed ({}): {stderr}", describe_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "killed by signal".into(),
    }
}

impl RuntimeError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RuntimeError::CommandFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// The failing command line, when there is one
    pub fn command(&self) -> Option<&str> {
        match self {
            RuntimeError::CommandFailed { command, .. }
            | RuntimeError::TimedOut { command, .. }
            | RuntimeError::Io { command, .. } => Some(command),
            RuntimeError::Unavailable { .. } => None,
        }
    }

    /// Worth another bring-up attempt. A missing tool never fixes itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::CommandFailed { .. } | RuntimeError::TimedOut { .. }
        )
    }
}

/// Per-service operations offered from the dashboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    Up,
    Restart,
    Stop,
    Remove,
}

impl ServiceAction {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceAction::Up => "Start",
            ServiceAction::Restart => "Restart",
            ServiceAction::Stop => "Stop",
            ServiceAction::Remove => "Remove",
        }
    }
}

/// Everything the supervisor needs from the container backend
#[async_trait]
pub trait StackRuntime: Send + Sync {
    /// Service names declared in the stack manifest
    async fn list_services(&self) -> Result<Vec<ServiceKey>, RuntimeError>;

    /// Current state of every container in the project, stopped ones included
    async fn snapshot_all(&self) -> Result<SnapshotMap, RuntimeError>;

    /// Last `lines` lines of a service's combined output
    async fn tail_logs(&self, key: &str, lines: usize) -> Result<String, RuntimeError>;

    /// Create and start every service, detached
    async fn bring_up(&self) -> Result<(), RuntimeError>;

    /// Stop and remove the stack, optionally with its named volumes
    async fn tear_down(&self, remove_volumes: bool) -> Result<(), RuntimeError>;

    async fn service_action(&self, action: ServiceAction, key: &str) -> Result<(), RuntimeError>;

    /// Stream logs to the terminal until the tool exits or the future is
    /// dropped. `None` follows every service.
    async fn follow_logs(&self, key: Option<&str>, lines: usize) -> Result<(), RuntimeError>;
}
