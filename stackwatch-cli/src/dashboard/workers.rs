//! Background workers feeding the dashboard.
//!
//! Three long-running tasks share one [`DashboardState`] lock. None of them
//! holds the lock across a process call or a network probe: read what is
//! needed, release, do the I/O, then lock again to write the result. Every
//! wait races the stop signal, so shutdown takes at most one in-flight step.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, RwLock, watch};

use stackwatch_core::catalog::{Catalog, ServiceKey};
use stackwatch_core::dashboard::{DashboardState, merge_services};
use stackwatch_core::probe::{Probe, ProbeTimeouts};
use stackwatch_core::readiness::evaluate_readiness;
use stackwatch_core::runtime::StackRuntime;

/// Service discovery runs at most this often once the list is known
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(15);
const PROBE_TICK: Duration = Duration::from_millis(250);
const PRIORITY_REARM: Duration = Duration::from_millis(50);
const LOGS_TICK: Duration = Duration::from_millis(200);
const LOGS_REFRESH: Duration = Duration::from_secs(2);

pub const NO_LOGS: &str = "No container logs yet.";

pub struct Shared {
    pub state: RwLock<DashboardState>,
    changed: AtomicBool,
    probe_now: AtomicBool,
    probe_wake: Notify,
    logs_reset: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl Shared {
    pub fn new(state: DashboardState) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            state: RwLock::new(state),
            changed: AtomicBool::new(true),
            probe_now: AtomicBool::new(false),
            probe_wake: Notify::new(),
            logs_reset: AtomicBool::new(false),
            stop_tx,
        })
    }

    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }

    /// Returns and clears the redraw flag
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Ask the probe worker to check the selected service next
    pub fn request_probe(&self) {
        self.probe_now.store(true, Ordering::Release);
        self.probe_wake.notify_one();
    }

    /// Make the logs worker fetch right away instead of at the next refresh
    pub fn reset_logs_timer(&self) {
        self.logs_reset.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.probe_wake.notify_one();
    }

    fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}

/// Sleep for `duration` unless stopped first. Returns true when stopped.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let stopped = tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stop.wait_for(|stopped| *stopped) => true,
    };
    stopped || *stop.borrow()
}

/// Drive `fut` to completion unless stopped first
async fn until_stopped<F: Future>(stop: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        output = fut => Some(output),
        _ = stop.wait_for(|stopped| *stopped) => None,
    }
}

pub async fn snapshot_worker(
    shared: Arc<Shared>,
    runtime: Arc<dyn StackRuntime>,
    catalog: Arc<Catalog>,
    interval: Duration,
) {
    let mut stop = shared.subscribe_stop();
    let mut discovered: Vec<ServiceKey> = Vec::new();
    let mut last_discovery: Option<Instant> = None;
    // Stays on screen until discovery works again
    let mut discovery_error: Option<String> = None;

    while !*stop.borrow() {
        let discovery_due = discovered.is_empty()
            || last_discovery.is_none_or(|at| at.elapsed() >= DISCOVERY_INTERVAL);
        if discovery_due {
            match until_stopped(&mut stop, runtime.list_services()).await {
                None => break,
                Some(Ok(keys)) => {
                    discovered = keys;
                    discovery_error = None;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "service discovery failed");
                    discovery_error = Some(e.to_string());
                }
            }
            last_discovery = Some(Instant::now());
        }

        let Some(result) = until_stopped(&mut stop, runtime.snapshot_all()).await else {
            break;
        };

        {
            let mut state = shared.state.write().await;
            match result {
                Ok(snapshots) => {
                    let services = merge_services(
                        discovered
                            .iter()
                            .chain(catalog.keys())
                            .chain(snapshots.keys()),
                    );
                    state.set_services(services);
                    state.publish_snapshot(snapshots);
                    if let Some(error) = &discovery_error {
                        state.publish_error(error.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "snapshot failed");
                    state.publish_error(e.to_string());
                }
            }
        }
        shared.mark_changed();

        if wait_or_stop(&mut stop, interval).await {
            break;
        }
    }
    tracing::debug!("snapshot worker stopped");
}

pub async fn probe_worker(
    shared: Arc<Shared>,
    probe: Arc<dyn Probe>,
    catalog: Arc<Catalog>,
    timeouts: ProbeTimeouts,
) {
    let mut stop = shared.subscribe_stop();
    let mut cursor = 0usize;

    while !*stop.borrow() {
        let priority = shared.probe_now.swap(false, Ordering::AcqRel);

        let (target, probed_selection) = {
            let state = shared.state.read().await;
            let selected = priority
                .then(|| state.selected_service().map(str::to_owned))
                .flatten();
            let probed_selection = selected.is_some();
            let key = selected.or_else(|| {
                let services = state.services();
                if services.is_empty() {
                    return None;
                }
                cursor %= services.len();
                let key = services[cursor].clone();
                cursor += 1;
                Some(key)
            });
            let target = key.map(|key| {
                let snapshot = state.snapshots.get(&key).cloned();
                (key, snapshot)
            });
            (target, probed_selection)
        };

        if let Some((key, snapshot)) = target {
            let evaluation =
                evaluate_readiness(&catalog, &key, snapshot.as_ref(), probe.as_ref(), timeouts);
            let Some(result) = until_stopped(&mut stop, evaluation).await else {
                break;
            };
            shared.state.write().await.set_readiness(&key, result);
            shared.mark_changed();
        }

        let delay = if probed_selection {
            PRIORITY_REARM
        } else {
            PROBE_TICK
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.probe_wake.notified() => {}
            _ = stop.wait_for(|stopped| *stopped) => break,
        }
    }
    tracing::debug!("probe worker stopped");
}

pub async fn logs_worker(shared: Arc<Shared>, runtime: Arc<dyn StackRuntime>, tail_lines: usize) {
    let mut stop = shared.subscribe_stop();
    let mut shown: Option<ServiceKey> = None;
    let mut last_fetch: Option<Instant> = None;

    while !*stop.borrow() {
        let selected = shared
            .state
            .read()
            .await
            .selected_service()
            .map(str::to_owned);

        let reset = shared.logs_reset.swap(false, Ordering::AcqRel);
        if reset || selected != shown {
            shown = selected.clone();
            last_fetch = None;
        }

        let due = last_fetch.is_none_or(|at| at.elapsed() >= LOGS_REFRESH);
        if let (Some(key), true) = (selected, due) {
            let Some(fetched) = until_stopped(&mut stop, runtime.tail_logs(&key, tail_lines)).await
            else {
                break;
            };
            last_fetch = Some(Instant::now());

            let text = match fetched {
                Ok(text) if text.trim().is_empty() => NO_LOGS.to_string(),
                Ok(text) => text,
                Err(e) => format!("Could not read logs: {e}"),
            };
            // The selection may have moved while the fetch was running
            if shared.state.write().await.commit_logs(&key, text) {
                shared.mark_changed();
            }
        }

        if wait_or_stop(&mut stop, LOGS_TICK).await {
            break;
        }
    }
    tracing::debug!("logs worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackwatch_core::catalog::ServiceDefinition;
    use stackwatch_core::dashboard::LOADING_LOGS;
    use stackwatch_core::fake::{FakeFailure, FakeProbe, FakeRuntime};
    use stackwatch_core::snapshot::{LifecycleState, ServiceSnapshot, SnapshotMap};

    fn running(keys: &[&str]) -> SnapshotMap {
        keys.iter()
            .map(|k| (k.to_string(), ServiceSnapshot::new(*k, LifecycleState::Running)))
            .collect()
    }

    fn state_with(keys: &[&str]) -> DashboardState {
        let mut state = DashboardState::new();
        state.set_services(keys.iter().map(|k| k.to_string()).collect());
        state
    }

    #[tokio::test]
    async fn test_snapshot_worker_merges_all_sources() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_services(["api", "worker"])
                .with_snapshot(running(&["api", "sidecar"])),
        );
        let catalog = Arc::new(Catalog::new([
            ServiceDefinition::new("api", "API"),
            ServiceDefinition::new("db", "DB"),
        ]));
        let shared = Shared::new(DashboardState::new());
        let handle = tokio::spawn(snapshot_worker(
            shared.clone(),
            runtime,
            catalog,
            Duration::from_millis(20),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shared.stop();
        handle.await.unwrap();

        let state = shared.state.read().await;
        assert_eq!(state.services(), ["api", "db", "sidecar", "worker"]);
        assert!(state.snapshots["sidecar"].is_running());
        assert!(shared.take_changed());
    }

    #[tokio::test]
    async fn test_snapshot_error_is_published() {
        let runtime = Arc::new(
            FakeRuntime::new().with_snapshot_failure(FakeFailure::failed(1, "daemon down")),
        );
        let shared = Shared::new(DashboardState::new());
        let handle = tokio::spawn(snapshot_worker(
            shared.clone(),
            runtime,
            Arc::new(Catalog::default()),
            Duration::from_secs(10),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let error = shared.state.read().await.last_error.clone();
        assert!(error.unwrap().contains("daemon down"));

        shared.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_discovery_error_is_published() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_list_failure(FakeFailure::failed(1, "no compose file"))
                .with_snapshot(running(&["api"])),
        );
        let shared = Shared::new(DashboardState::new());
        let handle = tokio::spawn(snapshot_worker(
            shared.clone(),
            runtime,
            Arc::new(Catalog::default()),
            Duration::from_secs(10),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shared.stop();
        handle.await.unwrap();

        let state = shared.state.read().await;
        assert!(state.last_error.as_deref().unwrap().contains("no compose file"));
        assert!(state.snapshots["api"].is_running());
        assert!(shared.take_changed());
    }

    #[tokio::test]
    async fn test_discovery_repeats_only_while_list_is_empty() {
        let empty = Arc::new(FakeRuntime::new());
        let known = Arc::new(FakeRuntime::new().with_services(["api"]));
        let shared_empty = Shared::new(DashboardState::new());
        let shared_known = Shared::new(DashboardState::new());
        let handles = vec![
            tokio::spawn(snapshot_worker(
                shared_empty.clone(),
                empty.clone(),
                Arc::new(Catalog::default()),
                Duration::from_millis(20),
            )),
            tokio::spawn(snapshot_worker(
                shared_known.clone(),
                known.clone(),
                Arc::new(Catalog::default()),
                Duration::from_millis(20),
            )),
        ];

        tokio::time::sleep(Duration::from_millis(200)).await;
        shared_empty.stop();
        shared_known.stop();
        for handle in handles {
            handle.await.unwrap();
        }

        // Every tick asks again while nothing is known
        assert!(empty.list_calls() >= 3);
        // Once known, only every discovery interval
        assert_eq!(known.list_calls(), 1);
        assert!(known.snapshot_calls() >= 3);
    }

    #[tokio::test]
    async fn test_priority_probe_targets_selection() {
        let catalog = Arc::new(Catalog::new([
            ServiceDefinition::new("a", "A").url("http://a"),
            ServiceDefinition::new("b", "B").url("http://b"),
            ServiceDefinition::new("c", "C").url("http://c"),
        ]));
        let mut state = state_with(&["a", "b", "c"]);
        state.publish_snapshot(running(&["a", "b", "c"]));
        state.select(2);
        let shared = Shared::new(state);
        shared.request_probe();

        let probe = Arc::new(FakeProbe::new().with_http("http://c", Ok(200)));
        let handle = tokio::spawn(probe_worker(
            shared.clone(),
            probe.clone(),
            catalog,
            ProbeTimeouts::default(),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shared.stop();
        handle.await.unwrap();

        assert_eq!(probe.calls().first().map(String::as_str), Some("http://c"));
        let state = shared.state.read().await;
        assert!(state.readiness["c"].ready);
    }

    #[tokio::test]
    async fn test_probe_worker_round_robin() {
        let catalog = Arc::new(Catalog::new([
            ServiceDefinition::new("a", "A").url("http://a"),
            ServiceDefinition::new("b", "B").url("http://b"),
        ]));
        let mut state = state_with(&["a", "b"]);
        state.publish_snapshot(running(&["a", "b"]));
        let shared = Shared::new(state);

        let probe = Arc::new(FakeProbe::new());
        let handle = tokio::spawn(probe_worker(
            shared.clone(),
            probe.clone(),
            catalog,
            ProbeTimeouts::default(),
        ));

        tokio::time::sleep(Duration::from_millis(600)).await;
        shared.stop();
        handle.await.unwrap();

        let calls = probe.calls();
        assert!(calls.len() >= 2);
        assert_eq!(&calls[..2], ["http://a", "http://b"]);
        assert_eq!(shared.state.read().await.readiness.len(), 2);
    }

    fn three_services() -> (Arc<Catalog>, DashboardState) {
        let catalog = Arc::new(Catalog::new([
            ServiceDefinition::new("a", "A").url("http://a"),
            ServiceDefinition::new("b", "B").url("http://b"),
            ServiceDefinition::new("c", "C").url("http://c"),
        ]));
        let mut state = state_with(&["a", "b", "c"]);
        state.publish_snapshot(running(&["a", "b", "c"]));
        state.select(2);
        (catalog, state)
    }

    #[tokio::test]
    async fn test_priority_probe_rearms_quickly() {
        let (catalog, state) = three_services();
        let shared = Shared::new(state);
        let probe = Arc::new(FakeProbe::new());
        let handle = tokio::spawn(probe_worker(
            shared.clone(),
            probe.clone(),
            catalog,
            ProbeTimeouts::default(),
        ));

        // "a" is probed first, then the worker sleeps a full tick
        tokio::time::sleep(Duration::from_millis(30)).await;
        shared.request_probe();
        // "c" jumps the queue, and "b" follows after the short re-arm
        tokio::time::sleep(Duration::from_millis(120)).await;
        shared.stop();
        handle.await.unwrap();

        assert_eq!(probe.calls(), ["http://a", "http://c", "http://b"]);
    }

    #[tokio::test]
    async fn test_normal_probe_waits_full_tick() {
        let (catalog, state) = three_services();
        let shared = Shared::new(state);
        let probe = Arc::new(FakeProbe::new());
        let handle = tokio::spawn(probe_worker(
            shared.clone(),
            probe.clone(),
            catalog,
            ProbeTimeouts::default(),
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        shared.stop();
        handle.await.unwrap();

        assert_eq!(probe.calls(), ["http://a"]);
    }

    #[tokio::test]
    async fn test_priority_without_selection_keeps_normal_tick() {
        let (catalog, populated) = three_services();
        let shared = Shared::new(DashboardState::new());
        let probe = Arc::new(FakeProbe::new());
        let handle = tokio::spawn(probe_worker(
            shared.clone(),
            probe.clone(),
            catalog,
            ProbeTimeouts::default(),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        shared.request_probe();
        tokio::time::sleep(Duration::from_millis(10)).await;
        *shared.state.write().await = populated;

        // Nothing was selected when asked, so the next turn is a full tick away
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(probe.calls().is_empty());

        shared.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_logs_timer_reset_refetches() {
        let runtime = Arc::new(FakeRuntime::new().with_logs("a", "hello"));
        let shared = Shared::new(state_with(&["a"]));
        let handle = tokio::spawn(logs_worker(shared.clone(), runtime.clone(), 50));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runtime.log_requests().len(), 1);

        shared.reset_logs_timer();
        tokio::time::sleep(Duration::from_millis(300)).await;
        shared.stop();
        handle.await.unwrap();

        assert_eq!(runtime.log_requests(), ["a", "a"]);
    }

    #[tokio::test]
    async fn test_stale_logs_are_not_shown() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_logs("a", "from a")
                .with_logs("b", "from b")
                .with_latency(Duration::from_millis(200)),
        );
        let shared = Shared::new(state_with(&["a", "b"]));
        let handle = tokio::spawn(logs_worker(shared.clone(), runtime.clone(), 50));

        // The fetch for "a" is in flight; move on before it lands
        tokio::time::sleep(Duration::from_millis(50)).await;
        shared.state.write().await.select(1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(shared.state.read().await.logs_text, LOADING_LOGS);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(shared.state.read().await.logs_text, "from b");

        shared.stop();
        handle.await.unwrap();
        assert_eq!(&runtime.log_requests()[..2], ["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_logs_show_placeholder() {
        let runtime = Arc::new(FakeRuntime::new());
        let shared = Shared::new(state_with(&["a"]));
        let handle = tokio::spawn(logs_worker(shared.clone(), runtime, 50));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shared.stop();
        handle.await.unwrap();
        assert_eq!(shared.state.read().await.logs_text, NO_LOGS);
    }

    #[tokio::test]
    async fn test_workers_stop_within_bound() {
        let slow = Duration::from_secs(5);
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_services(["a"])
                .with_logs("a", "hello")
                .with_latency(slow),
        );
        let probe = Arc::new(FakeProbe::new().with_delay(slow));
        let catalog = Arc::new(Catalog::new([ServiceDefinition::new("a", "A").url("http://a")]));

        let mut state = state_with(&["a"]);
        state.publish_snapshot(running(&["a"]));
        let shared = Shared::new(state);

        let handles = vec![
            tokio::spawn(snapshot_worker(
                shared.clone(),
                runtime.clone(),
                catalog.clone(),
                Duration::from_millis(500),
            )),
            tokio::spawn(probe_worker(
                shared.clone(),
                probe,
                catalog,
                ProbeTimeouts::default(),
            )),
            tokio::spawn(logs_worker(shared.clone(), runtime, 50)),
        ];

        // Every worker is now blocked mid-call
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        shared.stop();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("worker should stop promptly")
                .unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
