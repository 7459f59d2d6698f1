//! Readiness policy: decides whether a service can be used yet.
//!
//! Signals are tried strongest first and the first one that applies decides:
//!
//! 1. no container at all
//! 2. the container's own healthcheck says unhealthy
//! 3. one-shot jobs: done means exited with code 0, nothing else counts
//! 4. the core service: running and its health endpoint answers below 500
//! 5. the container's own healthcheck says healthy
//! 6. not running
//! 7. declared HTTP URLs, in order
//! 8. declared TCP targets, in order
//! 9. running with nothing declared to probe
//!
//! Step 2 never applies to one-shot services; their verdict depends only on
//! how they exited.

use std::fmt;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::probe::{Probe, ProbeTimeouts};
use crate::snapshot::{HealthFlag, LifecycleState, ServiceSnapshot};

/// Which signal produced a readiness verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeSource {
    Compose,
    DockerHealth,
    Http,
    Tcp,
}

impl ProbeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeSource::Compose => "compose",
            ProbeSource::DockerHealth => "docker-health",
            ProbeSource::Http => "http",
            ProbeSource::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProbeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessResult {
    pub ready: bool,
    pub source: ProbeSource,
    pub detail: String,
}

impl ReadinessResult {
    pub fn ready(source: ProbeSource, detail: impl Into<String>) -> Self {
        Self {
            ready: true,
            source,
            detail: detail.into(),
        }
    }

    pub fn not_ready(source: ProbeSource, detail: impl Into<String>) -> Self {
        Self {
            ready: false,
            source,
            detail: detail.into(),
        }
    }
}

pub async fn evaluate_readiness(
    catalog: &Catalog,
    key: &str,
    snapshot: Option<&ServiceSnapshot>,
    probe: &dyn Probe,
    timeouts: ProbeTimeouts,
) -> ReadinessResult {
    let Some(snapshot) = snapshot else {
        return ReadinessResult::not_ready(ProbeSource::Compose, "Container not created");
    };
    let definition = catalog.get(key);
    let one_shot = definition.is_some_and(|def| def.one_shot);

    if !one_shot && snapshot.health == Some(HealthFlag::Unhealthy) {
        return ReadinessResult::not_ready(
            ProbeSource::DockerHealth,
            "Docker healthcheck reports unhealthy",
        );
    }

    if one_shot {
        return one_shot_readiness(snapshot);
    }

    if let Some(core) = catalog.core().filter(|core| core.key == key) {
        if !snapshot.is_running() {
            return ReadinessResult::not_ready(ProbeSource::Compose, snapshot.state.as_str());
        }
        return match probe.http_status(&core.health_url, timeouts.http).await {
            Ok(code) if code < 500 => {
                ReadinessResult::ready(ProbeSource::Http, format!("HTTP {code}"))
            }
            Ok(code) => ReadinessResult::not_ready(ProbeSource::Http, format!("HTTP {code}")),
            Err(e) => ReadinessResult::not_ready(ProbeSource::Http, e),
        };
    }

    if snapshot.health == Some(HealthFlag::Healthy) && snapshot.is_running() {
        return ReadinessResult::ready(
            ProbeSource::DockerHealth,
            "Docker healthcheck reports healthy",
        );
    }

    if !snapshot.is_running() {
        return ReadinessResult::not_ready(ProbeSource::Compose, snapshot.state.as_str());
    }

    let Some(definition) = definition.filter(|def| def.has_probes()) else {
        return ReadinessResult::ready(ProbeSource::Compose, "running");
    };

    let mut last_failure = None;

    for url in &definition.urls {
        match probe.http_status(url, timeouts.http).await {
            Ok(code) if code < 500 => {
                return ReadinessResult::ready(ProbeSource::Http, format!("HTTP {code}"));
            }
            Ok(code) => last_failure = Some((ProbeSource::Http, format!("{url}: HTTP {code}"))),
            Err(e) => last_failure = Some((ProbeSource::Http, format!("{url}: {e}"))),
        }
    }

    for target in &definition.tcp {
        match probe.tcp_connect(target, timeouts.tcp).await {
            Ok(()) => {
                return ReadinessResult::ready(ProbeSource::Tcp, format!("{target} reachable"));
            }
            Err(e) => last_failure = Some((ProbeSource::Tcp, format!("{target}: {e}"))),
        }
    }

    match last_failure {
        Some((source, detail)) => ReadinessResult::not_ready(source, detail),
        None => ReadinessResult::ready(ProbeSource::Compose, "running"),
    }
}

fn one_shot_readiness(snapshot: &ServiceSnapshot) -> ReadinessResult {
    match (snapshot.state, snapshot.exit_code) {
        (LifecycleState::Exited, Some(0)) => {
            ReadinessResult::ready(ProbeSource::Compose, "One-shot init completed")
        }
        (LifecycleState::Exited, Some(code)) => ReadinessResult::not_ready(
            ProbeSource::Compose,
            format!("One-shot init failed (exit {code})"),
        ),
        (state, _) => {
            ReadinessResult::not_ready(ProbeSource::Compose, format!("One-shot init {state}"))
        }
    }
}

/// A crashed or failing service, as opposed to one that is merely slow to
/// start. Startup waits abort on this instead of running out the clock.
pub fn is_in_error(catalog: &Catalog, key: &str, snapshot: Option<&ServiceSnapshot>) -> bool {
    let Some(snapshot) = snapshot else {
        return false;
    };

    let completed_one_shot = catalog.is_one_shot(key)
        && snapshot.state == LifecycleState::Exited
        && snapshot.exit_code == Some(0);
    if completed_one_shot {
        return false;
    }

    if snapshot.health == Some(HealthFlag::Unhealthy) {
        return true;
    }

    match snapshot.state {
        LifecycleState::Dead | LifecycleState::Removing => true,
        LifecycleState::Exited => snapshot.exit_code.is_some_and(|code| code != 0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ServiceDefinition;
    use crate::fake::FakeProbe;

    const ALL_STATES: [LifecycleState; 8] = [
        LifecycleState::Running,
        LifecycleState::Exited,
        LifecycleState::Dead,
        LifecycleState::Removing,
        LifecycleState::Created,
        LifecycleState::Restarting,
        LifecycleState::Paused,
        LifecycleState::Unknown,
    ];
    const ALL_HEALTH: [Option<HealthFlag>; 4] = [
        None,
        Some(HealthFlag::Healthy),
        Some(HealthFlag::Unhealthy),
        Some(HealthFlag::Starting),
    ];
    const EXIT_CODES: [Option<i32>; 4] = [None, Some(0), Some(1), Some(137)];

    fn catalog() -> Catalog {
        Catalog::new([
            ServiceDefinition::new("api", "API").url("http://127.0.0.1:8000/health"),
            ServiceDefinition::new("web", "Web").url("http://127.0.0.1:3000"),
            ServiceDefinition::new("db", "DB").tcp("127.0.0.1", 5432),
            ServiceDefinition::new("plain", "Plain"),
            ServiceDefinition::new("init", "Init").one_shot(),
        ])
        .with_core("api", "http://127.0.0.1:8000/health")
    }

    fn snapshot(
        key: &str,
        state: LifecycleState,
        health: Option<HealthFlag>,
        exit_code: Option<i32>,
    ) -> ServiceSnapshot {
        ServiceSnapshot {
            service: key.into(),
            container: None,
            state,
            health,
            exit_code,
            status: None,
        }
    }

    async fn evaluate(
        key: &str,
        snap: Option<&ServiceSnapshot>,
        probe: &FakeProbe,
    ) -> ReadinessResult {
        evaluate_readiness(&catalog(), key, snap, probe, ProbeTimeouts::default()).await
    }

    #[tokio::test]
    async fn test_not_created() {
        let probe = FakeProbe::new();
        let result = evaluate("plain", None, &probe).await;
        assert_eq!(
            result,
            ReadinessResult::not_ready(ProbeSource::Compose, "Container not created")
        );
    }

    #[tokio::test]
    async fn test_http_url_ready() {
        let probe = FakeProbe::new().with_http("http://127.0.0.1:3000", Ok(200));
        let snap = snapshot("web", LifecycleState::Running, None, None);
        let result = evaluate("web", Some(&snap), &probe).await;
        assert_eq!(result, ReadinessResult::ready(ProbeSource::Http, "HTTP 200"));
    }

    #[tokio::test]
    async fn test_http_server_error_falls_through_to_not_ready() {
        let probe = FakeProbe::new().with_http("http://127.0.0.1:3000", Ok(502));
        let snap = snapshot("web", LifecycleState::Running, None, None);
        let result = evaluate("web", Some(&snap), &probe).await;
        assert!(!result.ready);
        assert_eq!(result.source, ProbeSource::Http);
        assert!(result.detail.contains("HTTP 502"));
    }

    #[tokio::test]
    async fn test_tcp_target_ready() {
        let probe = FakeProbe::new().with_tcp("127.0.0.1:5432", Ok(()));
        let snap = snapshot("db", LifecycleState::Running, None, None);
        let result = evaluate("db", Some(&snap), &probe).await;
        assert!(result.ready);
        assert_eq!(result.source, ProbeSource::Tcp);
    }

    #[tokio::test]
    async fn test_one_shot_completed() {
        let probe = FakeProbe::new();
        let snap = snapshot("init", LifecycleState::Exited, None, Some(0));
        let result = evaluate("init", Some(&snap), &probe).await;
        assert_eq!(
            result,
            ReadinessResult::ready(ProbeSource::Compose, "One-shot init completed")
        );
    }

    #[tokio::test]
    async fn test_one_shot_ignores_health_for_every_snapshot() {
        let probe = FakeProbe::new();
        for state in ALL_STATES {
            for health in ALL_HEALTH {
                for exit_code in EXIT_CODES {
                    let snap = snapshot("init", state, health, exit_code);
                    let result = evaluate("init", Some(&snap), &probe).await;
                    let expected = state == LifecycleState::Exited && exit_code == Some(0);
                    assert_eq!(result.ready, expected, "{state:?} {health:?} {exit_code:?}");
                    assert_eq!(result.source, ProbeSource::Compose);
                }
            }
        }
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_core_running_but_unreachable() {
        let probe = FakeProbe::new()
            .with_http("http://127.0.0.1:8000/health", Err("connection refused".into()));
        let snap = snapshot("api", LifecycleState::Running, Some(HealthFlag::Healthy), None);
        let result = evaluate("api", Some(&snap), &probe).await;
        assert_eq!(
            result,
            ReadinessResult::not_ready(ProbeSource::Http, "connection refused")
        );
    }

    #[tokio::test]
    async fn test_core_requires_running() {
        let probe = FakeProbe::new().with_http("http://127.0.0.1:8000/health", Ok(200));
        let snap = snapshot("api", LifecycleState::Restarting, None, None);
        let result = evaluate("api", Some(&snap), &probe).await;
        assert!(!result.ready);
        assert_eq!(result.detail, "restarting");
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_beats_probes() {
        let probe = FakeProbe::new().with_http("http://127.0.0.1:3000", Ok(200));
        let snap = snapshot("web", LifecycleState::Running, Some(HealthFlag::Unhealthy), None);
        let result = evaluate("web", Some(&snap), &probe).await;
        assert!(!result.ready);
        assert_eq!(result.source, ProbeSource::DockerHealth);
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_healthy_skips_probes() {
        let probe = FakeProbe::new();
        let snap = snapshot("web", LifecycleState::Running, Some(HealthFlag::Healthy), None);
        let result = evaluate("web", Some(&snap), &probe).await;
        assert!(result.ready);
        assert_eq!(result.source, ProbeSource::DockerHealth);
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_running_without_probes_is_optimistic() {
        let probe = FakeProbe::new();
        let snap = snapshot("plain", LifecycleState::Running, None, None);
        let result = evaluate("plain", Some(&snap), &probe).await;
        assert_eq!(result, ReadinessResult::ready(ProbeSource::Compose, "running"));

        // Services the catalog does not know are treated the same way
        let snap = snapshot("sidecar", LifecycleState::Running, None, None);
        assert!(evaluate("sidecar", Some(&snap), &probe).await.ready);
    }

    #[tokio::test]
    async fn test_not_running_reports_state() {
        let probe = FakeProbe::new();
        let snap = snapshot("web", LifecycleState::Created, None, None);
        let result = evaluate("web", Some(&snap), &probe).await;
        assert_eq!(result, ReadinessResult::not_ready(ProbeSource::Compose, "created"));
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let probe = FakeProbe::new()
            .with_http("http://127.0.0.1:3000", Ok(404))
            .with_tcp("127.0.0.1:5432", Err("connection refused".into()));
        for key in ["web", "db", "plain", "init", "api"] {
            for state in ALL_STATES {
                let snap = snapshot(key, state, None, Some(0));
                let first = evaluate(key, Some(&snap), &probe).await;
                let second = evaluate(key, Some(&snap), &probe).await;
                assert_eq!(first, second);
            }
        }
    }

    #[tokio::test]
    async fn test_ready_services_are_never_in_error() {
        let reachable = FakeProbe::new()
            .with_http("http://127.0.0.1:8000/health", Ok(200))
            .with_http("http://127.0.0.1:3000", Ok(200))
            .with_tcp("127.0.0.1:5432", Ok(()));
        let unreachable = FakeProbe::new();
        let catalog = catalog();

        for probe in [&reachable, &unreachable] {
            for key in ["api", "web", "db", "plain"] {
                for state in ALL_STATES {
                    for health in ALL_HEALTH {
                        for exit_code in EXIT_CODES {
                            let snap = snapshot(key, state, health, exit_code);
                            let result = evaluate(key, Some(&snap), probe).await;
                            if result.ready {
                                assert!(
                                    !is_in_error(&catalog, key, Some(&snap)),
                                    "{key} {state:?} {health:?} {exit_code:?}"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_is_in_error() {
        let catalog = catalog();
        let check = |key: &str, state, health, code| {
            is_in_error(&catalog, key, Some(&snapshot(key, state, health, code)))
        };

        assert!(check("web", LifecycleState::Dead, None, None));
        assert!(check("web", LifecycleState::Removing, None, None));
        assert!(check("web", LifecycleState::Exited, None, Some(1)));
        assert!(check("web", LifecycleState::Running, Some(HealthFlag::Unhealthy), None));
        assert!(check("init", LifecycleState::Exited, None, Some(2)));

        assert!(!check("web", LifecycleState::Running, None, None));
        assert!(!check("web", LifecycleState::Created, None, None));
        assert!(!check("web", LifecycleState::Exited, None, Some(0)));
        assert!(!check("web", LifecycleState::Exited, None, None));
        assert!(!check("init", LifecycleState::Exited, Some(HealthFlag::Unhealthy), Some(0)));
        assert!(!check("init", LifecycleState::Running, None, None));
        assert!(!is_in_error(&catalog, "web", None));
    }
}
