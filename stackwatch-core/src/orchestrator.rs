//! Start, stop and inspect the whole stack.
//!
//! `start` is bring-up (with a bounded retry) followed by a single readiness
//! wait: one loop, one deadline. A service found in error ends the wait early
//! so the caller can show why instead of waiting out the clock.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::catalog::{Catalog, ServiceKey};
use crate::config::TimingConfig;
use crate::probe::Probe;
use crate::readiness::{evaluate_readiness, is_in_error, ProbeSource, ReadinessResult};
use crate::runtime::{RuntimeError, StackRuntime};
use crate::snapshot::{ServiceSnapshot, SnapshotMap};

/// How a `start` ended once bring-up itself succeeded
#[derive(Debug)]
pub enum StartOutcome {
    /// Every known service is ready
    Ready {
        services: Vec<ServiceKey>,
        elapsed: Duration,
    },
    /// At least one service crashed or reports unhealthy
    Failed { services: Vec<ServiceSnapshot> },
    /// The deadline passed with these services still not ready
    TimedOut {
        pending: Vec<(ServiceKey, ReadinessResult)>,
    },
}

/// One line of `stack status`
#[derive(Clone, Debug, Serialize)]
pub struct StatusRow {
    pub service: ServiceKey,
    pub display_name: String,
    pub state: String,
    pub health: String,
    pub ready: bool,
    pub source: ProbeSource,
    pub detail: String,
}

pub struct Orchestrator {
    runtime: Arc<dyn StackRuntime>,
    probe: Arc<dyn Probe>,
    catalog: Arc<Catalog>,
    timing: TimingConfig,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn StackRuntime>,
        probe: Arc<dyn Probe>,
        catalog: Arc<Catalog>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            runtime,
            probe,
            catalog,
            timing,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Bring the stack up and wait until it is usable.
    ///
    /// `Err` means bring-up never succeeded or the runtime went away; every
    /// other ending is a [`StartOutcome`].
    pub async fn start(&self) -> Result<StartOutcome, RuntimeError> {
        self.bring_up_with_retry().await?;
        self.wait_until_ready().await
    }

    async fn bring_up_with_retry(&self) -> Result<(), RuntimeError> {
        let attempts = self.timing.bring_up_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.runtime.bring_up().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "bring-up failed, retrying");
                    tokio::time::sleep(self.timing.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "bring-up failed");
                    return Err(e);
                }
            }
        }
    }

    /// Poll until every known service is ready, one is in error, or the
    /// deadline passes
    pub async fn wait_until_ready(&self) -> Result<StartOutcome, RuntimeError> {
        let started = Instant::now();
        let deadline = started + self.timing.ready_timeout();
        let manifest = self.manifest_keys().await?;
        let timeouts = self.timing.probe_timeouts();
        let mut pending = Vec::new();

        loop {
            match self.runtime.snapshot_all().await {
                Ok(snapshots) => {
                    let known = self.known_services(&manifest, &snapshots);

                    let failed: Vec<ServiceSnapshot> = known
                        .iter()
                        .filter_map(|key| snapshots.get(key))
                        .filter(|snap| is_in_error(&self.catalog, &snap.service, Some(snap)))
                        .cloned()
                        .collect();
                    if !failed.is_empty() {
                        let names: Vec<&str> = failed.iter().map(|s| s.service.as_str()).collect();
                        tracing::error!(services = ?names, "services in error during startup");
                        return Ok(StartOutcome::Failed { services: failed });
                    }

                    pending.clear();
                    for key in &known {
                        let result = evaluate_readiness(
                            &self.catalog,
                            key,
                            snapshots.get(key),
                            self.probe.as_ref(),
                            timeouts,
                        )
                        .await;
                        if !result.ready {
                            pending.push((key.clone(), result));
                        }
                    }

                    if pending.is_empty() {
                        let elapsed = started.elapsed();
                        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "stack ready");
                        return Ok(StartOutcome::Ready {
                            services: known.into_iter().collect(),
                            elapsed,
                        });
                    }
                    tracing::debug!(pending = pending.len(), "waiting for services");
                }
                Err(e @ RuntimeError::Unavailable { .. }) => return Err(e),
                Err(e) => tracing::warn!(error = %e, "snapshot failed, still waiting"),
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(pending = pending.len(), "readiness wait timed out");
                return Ok(StartOutcome::TimedOut { pending });
            }
            tokio::time::sleep(self.timing.poll_interval().min(deadline - now)).await;
        }
    }

    pub async fn stop(&self, remove_volumes: bool) -> Result<(), RuntimeError> {
        self.runtime.tear_down(remove_volumes).await
    }

    /// One snapshot and one readiness pass, no waiting
    pub async fn status(&self) -> Result<Vec<StatusRow>, RuntimeError> {
        let snapshots = self.runtime.snapshot_all().await?;
        let timeouts = self.timing.probe_timeouts();

        let mut keys: BTreeSet<ServiceKey> = self.catalog.keys().cloned().collect();
        keys.extend(snapshots.keys().cloned());

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let snapshot = snapshots.get(&key);
            let result =
                evaluate_readiness(&self.catalog, &key, snapshot, self.probe.as_ref(), timeouts)
                    .await;
            rows.push(StatusRow {
                display_name: self.catalog.display_name(&key).to_string(),
                state: snapshot
                    .map(|s| s.state.as_str().to_string())
                    .unwrap_or_else(|| "not created".into()),
                health: snapshot
                    .and_then(|s| s.health)
                    .map(|h| h.as_str().to_string())
                    .unwrap_or_else(|| "-".into()),
                ready: result.ready,
                source: result.source,
                detail: result.detail,
                service: key,
            });
        }
        Ok(rows)
    }

    /// Recent output of a service, for the failure report after `start`
    pub async fn error_logs(&self, key: &str) -> Result<String, RuntimeError> {
        self.runtime.tail_logs(key, self.timing.error_log_lines).await
    }

    async fn manifest_keys(&self) -> Result<Vec<ServiceKey>, RuntimeError> {
        match self.runtime.list_services().await {
            Ok(keys) if !keys.is_empty() => Ok(keys),
            Ok(_) => Ok(self.catalog.keys().cloned().collect()),
            Err(e @ RuntimeError::Unavailable { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "could not list services, using the catalog");
                Ok(self.catalog.keys().cloned().collect())
            }
        }
    }

    fn known_services(
        &self,
        manifest: &[ServiceKey],
        snapshots: &SnapshotMap,
    ) -> BTreeSet<ServiceKey> {
        let mut known: BTreeSet<ServiceKey> = manifest.iter().cloned().collect();
        known.extend(snapshots.keys().cloned());
        if let Some(core) = self.catalog.core() {
            known.insert(core.key.clone());
        }
        known
    }
}
