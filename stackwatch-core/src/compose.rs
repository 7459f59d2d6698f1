//! `docker compose` backed runtime
//!
//! Every operation is one invocation of the compose CLI. Short queries run
//! under the command timeout; `up` and `down` get the much longer lifecycle
//! timeout since they may pull images.

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::catalog::ServiceKey;
use crate::config::{ComposeSettings, TimingConfig};
use crate::runtime::{RuntimeError, ServiceAction, StackRuntime};
use crate::snapshot::{parse_snapshot_output, SnapshotMap};

pub struct ComposeRuntime {
    settings: ComposeSettings,
    timing: TimingConfig,
}

impl ComposeRuntime {
    pub fn new(settings: ComposeSettings, timing: TimingConfig) -> Self {
        Self { settings, timing }
    }

    fn program(&self) -> &str {
        self.settings
            .command
            .first()
            .map(String::as_str)
            .unwrap_or("docker")
    }

    /// Full argument list after the program: leading command words, then
    /// project selection, then `args`
    fn base_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = self.settings.command.iter().skip(1).cloned().collect();
        for file in &self.settings.files {
            full.push("-f".into());
            full.push(file.display().to_string());
        }
        if let Some(project) = &self.settings.project_name {
            full.push("-p".into());
            full.push(project.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.program())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(args);
        if let Some(dir) = &self.settings.project_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output, RuntimeError> {
        let args = self.base_args(args);
        let command = self.command_line(&args);
        tracing::debug!(%command, "running compose");

        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| self.spawn_error(&command, e))?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| RuntimeError::Io {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(
                    %command,
                    timeout_secs = timeout.as_secs(),
                    "compose command timed out"
                );
                return Err(RuntimeError::TimedOut { command, timeout });
            }
        };

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn spawn_error(&self, command: &str, e: std::io::Error) -> RuntimeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::Unavailable {
                program: self.program().to_string(),
            }
        } else {
            RuntimeError::Io {
                command: command.to_string(),
                source: e,
            }
        }
    }
}

#[async_trait]
impl StackRuntime for ComposeRuntime {
    async fn list_services(&self) -> Result<Vec<ServiceKey>, RuntimeError> {
        let output = self
            .run(&["config", "--services"], self.timing.command_timeout())
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    async fn snapshot_all(&self) -> Result<SnapshotMap, RuntimeError> {
        let output = self
            .run(&["ps", "-a", "--format", "json"], self.timing.command_timeout())
            .await?;
        Ok(parse_snapshot_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn tail_logs(&self, key: &str, lines: usize) -> Result<String, RuntimeError> {
        let tail = format!("--tail={lines}");
        let output = self
            .run(
                &["logs", "--no-color", &tail, key],
                self.timing.command_timeout(),
            )
            .await?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        Ok(text)
    }

    async fn bring_up(&self) -> Result<(), RuntimeError> {
        tracing::info!("bringing the stack up");
        self.run(&["up", "-d"], self.timing.lifecycle_timeout())
            .await
            .map(|_| ())
    }

    async fn tear_down(&self, remove_volumes: bool) -> Result<(), RuntimeError> {
        tracing::info!(remove_volumes, "tearing the stack down");
        let args: &[&str] = if remove_volumes {
            &["down", "-v"]
        } else {
            &["down"]
        };
        self.run(args, self.timing.lifecycle_timeout())
            .await
            .map(|_| ())
    }

    async fn service_action(&self, action: ServiceAction, key: &str) -> Result<(), RuntimeError> {
        tracing::info!(service = key, action = action.label(), "service action");
        let args: Vec<&str> = match action {
            ServiceAction::Up => vec!["up", "-d", key],
            ServiceAction::Restart => vec!["restart", key],
            ServiceAction::Stop => vec!["stop", key],
            ServiceAction::Remove => vec!["rm", "-s", "-f", key],
        };
        let timeout = match action {
            ServiceAction::Up => self.timing.lifecycle_timeout(),
            _ => self.timing.command_timeout(),
        };
        self.run(&args, timeout).await.map(|_| ())
    }

    async fn follow_logs(&self, key: Option<&str>, lines: usize) -> Result<(), RuntimeError> {
        let tail = format!("--tail={lines}");
        let mut args = vec!["logs", "-f", tail.as_str()];
        args.extend(key);
        let args = self.base_args(&args);
        let command = self.command_line(&args);

        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(&command, e))?;
        let status = child.wait().await.map_err(|source| RuntimeError::Io {
            command: command.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command,
                exit_code: status.code(),
                stderr: String::new(),
            })
        }
    }
}
