//! Scripted runtime and probe for tests and demos.
//!
//! Neither touches Docker or the network. Scripts are consumed in order and
//! the last snapshot keeps repeating, so a test only spells out the
//! transitions it cares about.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::{ServiceKey, TcpTarget};
use crate::probe::Probe;
use crate::runtime::{RuntimeError, ServiceAction, StackRuntime};
use crate::snapshot::SnapshotMap;

/// A failure the fake runtime can be scripted to return
#[derive(Clone, Debug)]
pub enum FakeFailure {
    Failed { exit_code: i32, stderr: String },
    TimedOut,
    Unavailable,
}

impl FakeFailure {
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        FakeFailure::Failed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    fn into_error(self, command: &str) -> RuntimeError {
        match self {
            FakeFailure::Failed { exit_code, stderr } => RuntimeError::CommandFailed {
                command: command.into(),
                exit_code: Some(exit_code),
                stderr,
            },
            FakeFailure::TimedOut => RuntimeError::TimedOut {
                command: command.into(),
                timeout: Duration::from_secs(1),
            },
            FakeFailure::Unavailable => RuntimeError::Unavailable {
                program: "fake".into(),
            },
        }
    }
}

#[derive(Default)]
struct FakeRuntimeState {
    services: Vec<ServiceKey>,
    list_failure: Option<FakeFailure>,
    snapshots: VecDeque<Result<SnapshotMap, FakeFailure>>,
    last_snapshot: SnapshotMap,
    bring_up_results: VecDeque<Result<(), FakeFailure>>,
    action_results: VecDeque<Result<(), FakeFailure>>,
    logs: BTreeMap<ServiceKey, String>,

    list_calls: usize,
    bring_up_calls: usize,
    snapshot_calls: usize,
    tear_downs: Vec<bool>,
    actions: Vec<(ServiceAction, ServiceKey)>,
    log_requests: Vec<ServiceKey>,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeRuntimeState>,
    latency: Duration,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services<I, S>(self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Make every `list_services` call fail
    pub fn with_list_failure(self, failure: FakeFailure) -> Self {
        self.lock().list_failure = Some(failure);
        self
    }

    /// Queue the next snapshot `snapshot_all` returns
    pub fn with_snapshot(self, snapshot: SnapshotMap) -> Self {
        self.lock().snapshots.push_back(Ok(snapshot));
        self
    }

    pub fn with_snapshot_failure(self, failure: FakeFailure) -> Self {
        self.lock().snapshots.push_back(Err(failure));
        self
    }

    /// Queue the outcome of the next `bring_up`; unscripted calls succeed
    pub fn with_bring_up(self, result: Result<(), FakeFailure>) -> Self {
        self.lock().bring_up_results.push_back(result);
        self
    }

    pub fn with_action_result(self, result: Result<(), FakeFailure>) -> Self {
        self.lock().action_results.push_back(result);
        self
    }

    pub fn with_logs(self, key: &str, text: &str) -> Self {
        self.lock().logs.insert(key.into(), text.into());
        self
    }

    /// Delay applied to every query
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn bring_up_calls(&self) -> usize {
        self.lock().bring_up_calls
    }

    pub fn snapshot_calls(&self) -> usize {
        self.lock().snapshot_calls
    }

    /// `remove_volumes` of every `tear_down` call, in order
    pub fn tear_downs(&self) -> Vec<bool> {
        self.lock().tear_downs.clone()
    }

    pub fn actions(&self) -> Vec<(ServiceAction, ServiceKey)> {
        self.lock().actions.clone()
    }

    pub fn log_requests(&self) -> Vec<ServiceKey> {
        self.lock().log_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeRuntimeState> {
        // A test that panicked while holding the lock already failed
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl StackRuntime for FakeRuntime {
    async fn list_services(&self) -> Result<Vec<ServiceKey>, RuntimeError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.list_calls += 1;
        match state.list_failure.clone() {
            Some(failure) => Err(failure.into_error("fake config --services")),
            None => Ok(state.services.clone()),
        }
    }

    async fn snapshot_all(&self) -> Result<SnapshotMap, RuntimeError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.snapshot_calls += 1;
        match state.snapshots.pop_front() {
            Some(Ok(snapshot)) => {
                state.last_snapshot = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(failure)) => Err(failure.into_error("fake ps")),
            None => Ok(state.last_snapshot.clone()),
        }
    }

    async fn tail_logs(&self, key: &str, lines: usize) -> Result<String, RuntimeError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.log_requests.push(key.into());
        let text = state.logs.get(key).cloned().unwrap_or_default();
        let all: Vec<&str> = text.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].join("\n"))
    }

    async fn bring_up(&self) -> Result<(), RuntimeError> {
        let mut state = self.lock();
        state.bring_up_calls += 1;
        match state.bring_up_results.pop_front() {
            Some(Err(failure)) => Err(failure.into_error("fake up -d")),
            _ => Ok(()),
        }
    }

    async fn tear_down(&self, remove_volumes: bool) -> Result<(), RuntimeError> {
        self.lock().tear_downs.push(remove_volumes);
        Ok(())
    }

    async fn service_action(&self, action: ServiceAction, key: &str) -> Result<(), RuntimeError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.actions.push((action, key.into()));
        match state.action_results.pop_front() {
            Some(Err(failure)) => Err(failure.into_error("fake action")),
            _ => Ok(()),
        }
    }

    async fn follow_logs(&self, key: Option<&str>, lines: usize) -> Result<(), RuntimeError> {
        if let Some(key) = key {
            self.tail_logs(key, lines).await?;
        }
        Ok(())
    }
}

/// Probe answering from fixed tables. Anything not in a table is refused.
#[derive(Default)]
pub struct FakeProbe {
    http: BTreeMap<String, Result<u16, String>>,
    tcp: BTreeMap<String, Result<(), String>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, url: &str, result: Result<u16, String>) -> Self {
        self.http.insert(url.into(), result);
        self
    }

    /// `target` is written `host:port`
    pub fn with_tcp(mut self, target: &str, result: Result<(), String>) -> Self {
        self.tcp.insert(target.into(), result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every URL and `host:port` probed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, what: String) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(what);
    }
}

#[async_trait]
impl Probe for FakeProbe {
    async fn http_status(&self, url: &str, _timeout: Duration) -> Result<u16, String> {
        self.record(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.http
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err("connection refused".into()))
    }

    async fn tcp_connect(&self, target: &TcpTarget, _timeout: Duration) -> Result<(), String> {
        let key = target.to_string();
        self.record(key.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.tcp
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err("connection refused".into()))
    }
}
