use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, ServiceCategory, ServiceDefinition, TcpTarget};
use crate::probe::ProbeTimeouts;

/// How the stack-management tool is invoked
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComposeSettings {
    /// Program plus leading arguments, e.g. `["docker", "compose"]`
    #[serde(default = "default_compose_command")]
    pub command: Vec<String>,

    /// Compose files passed with `-f`, in order
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Project name passed with `-p`
    #[serde(default)]
    pub project_name: Option<String>,

    /// Working directory for every invocation
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            command: default_compose_command(),
            files: Vec::new(),
            project_name: None,
            project_dir: None,
        }
    }
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".into(), "compose".into()]
}

/// The service whose own health endpoint gates the whole stack
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CoreSettings {
    pub service: String,
    pub health_url: String,
}

/// Poll intervals, deadlines and timeouts
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Total bring-up attempts, the first one included
    #[serde(default = "default_bring_up_attempts")]
    pub bring_up_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout_ms: u64,
    /// Limit for short queries (ps, config, logs, per-service actions)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Limit for `up` / `down`, which may pull images
    #[serde(default = "default_lifecycle_timeout")]
    pub lifecycle_timeout_secs: u64,
    /// Log lines dumped for a service found in error during startup
    #[serde(default = "default_error_log_lines")]
    pub error_log_lines: usize,
    /// Log lines shown in the dashboard
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

fn default_poll_interval() -> u64 {
    2000
}
fn default_ready_timeout() -> u64 {
    180
}
fn default_bring_up_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2000
}
fn default_http_timeout() -> u64 {
    800
}
fn default_tcp_timeout() -> u64 {
    300
}
fn default_command_timeout() -> u64 {
    30
}
fn default_lifecycle_timeout() -> u64 {
    600
}
fn default_error_log_lines() -> usize {
    160
}
fn default_tail_lines() -> usize {
    120
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            ready_timeout_secs: default_ready_timeout(),
            bring_up_attempts: default_bring_up_attempts(),
            retry_delay_ms: default_retry_delay(),
            http_timeout_ms: default_http_timeout(),
            tcp_timeout_ms: default_tcp_timeout(),
            command_timeout_secs: default_command_timeout(),
            lifecycle_timeout_secs: default_lifecycle_timeout(),
            error_log_lines: default_error_log_lines(),
            tail_lines: default_tail_lines(),
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_secs(self.lifecycle_timeout_secs)
    }

    pub fn probe_timeouts(&self) -> ProbeTimeouts {
        ProbeTimeouts {
            http: self.http_timeout(),
            tcp: self.tcp_timeout(),
        }
    }
}

/// Service definition in the stack file
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Display name (defaults to service key)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub category: ServiceCategory,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub tcp: Vec<TcpTarget>,

    #[serde(default)]
    pub one_shot: bool,
}

/// Root stack file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StackConfig {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub compose: ComposeSettings,

    #[serde(default)]
    pub core: Option<CoreSettings>,

    /// Service catalog; empty means "use the built-in reference stack"
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_version() -> String {
    "1".into()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            compose: ComposeSettings::default(),
            core: None,
            services: BTreeMap::new(),
            timing: TimingConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("core service '{0}' is not declared under services")]
    UnknownCore(String),
    #[error("service '{service}' has an empty health-check URL")]
    EmptyUrl { service: String },
    #[error("service '{service}' has a TCP target with port 0")]
    InvalidPort { service: String },
    #[error("compose command must name a program")]
    EmptyCommand,
    #[error("timing.{field} must be greater than zero")]
    ZeroTiming { field: &'static str },
}

pub const CONFIG_ENV: &str = "STACK_CONFIG";
const CONFIG_NAMES: [&str; 4] = ["stack.yaml", "stack.yml", ".stack.yaml", ".stack.yml"];

impl StackConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        // Relative compose paths are relative to the stack file
        if let Some(dir) = path.parent() {
            config.compose.anchor(dir);
        }
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: StackConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Find a stack file in the usual places, falling back to the built-in
    /// reference stack when there is none
    pub fn discover(start_dir: &Path) -> Result<(Option<PathBuf>, Self), ConfigError> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((Some(path), config));
            }
            tracing::warn!(path = %path.display(), "{} points at a missing file", CONFIG_ENV);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let config = Self::load(&path)?;
                    return Ok((Some(path), config));
                }
            }
            dir = current.parent();
        }

        Ok((None, Self::default()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compose.command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyCommand);
        }

        for (id, svc) in &self.services {
            if svc.urls.iter().any(|u| u.trim().is_empty()) {
                return Err(ConfigError::EmptyUrl { service: id.clone() });
            }
            if svc.tcp.iter().any(|t| t.port == 0) {
                return Err(ConfigError::InvalidPort { service: id.clone() });
            }
        }

        if let Some(core) = &self.core {
            if !self.services.is_empty() && !self.services.contains_key(&core.service) {
                return Err(ConfigError::UnknownCore(core.service.clone()));
            }
        }

        let timing = &self.timing;
        for (field, value) in [
            ("poll_interval_ms", timing.poll_interval_ms),
            ("ready_timeout_secs", timing.ready_timeout_secs),
            ("http_timeout_ms", timing.http_timeout_ms),
            ("tcp_timeout_ms", timing.tcp_timeout_ms),
            ("command_timeout_secs", timing.command_timeout_secs),
            ("lifecycle_timeout_secs", timing.lifecycle_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTiming { field });
            }
        }
        if timing.bring_up_attempts == 0 {
            return Err(ConfigError::ZeroTiming {
                field: "bring_up_attempts",
            });
        }

        Ok(())
    }

    /// Build the immutable catalog this configuration describes
    pub fn catalog(&self) -> Catalog {
        if self.services.is_empty() {
            let builtin = Catalog::builtin();
            return match &self.core {
                Some(core) => builtin.with_core(&core.service, &core.health_url),
                None => builtin,
            };
        }

        let catalog = Catalog::new(self.services.iter().map(|(id, svc)| ServiceDefinition {
            key: id.clone(),
            display_name: svc.name.clone().unwrap_or_else(|| id.clone()),
            category: svc.category,
            description: svc.description.clone(),
            urls: svc.urls.clone(),
            tcp: svc.tcp.clone(),
            one_shot: svc.one_shot,
        }));

        match &self.core {
            Some(core) => catalog.with_core(&core.service, &core.health_url),
            None => catalog,
        }
    }
}

impl ComposeSettings {
    fn anchor(&mut self, base: &Path) {
        for file in &mut self.files {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        match &self.project_dir {
            Some(dir) if dir.is_relative() => self.project_dir = Some(base.join(dir)),
            None => self.project_dir = Some(base.to_path_buf()),
            _ => {}
        }
    }
}
