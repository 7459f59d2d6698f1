//! Point-in-time container state as reported by the runtime.
//!
//! `compose ps --format json` has changed shape across releases: older
//! versions print one JSON array, newer ones print one object per line, and
//! field types drift (exit codes as numbers or strings). Parsing here is
//! tolerant: every row that can be mapped is kept, every row that cannot is
//! skipped.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::catalog::ServiceKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Running,
    Exited,
    Dead,
    Removing,
    Created,
    Restarting,
    Paused,
    Unknown,
}

impl LifecycleState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => LifecycleState::Running,
            "exited" => LifecycleState::Exited,
            "dead" => LifecycleState::Dead,
            "removing" => LifecycleState::Removing,
            "created" => LifecycleState::Created,
            "restarting" => LifecycleState::Restarting,
            "paused" => LifecycleState::Paused,
            _ => LifecycleState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Running => "running",
            LifecycleState::Exited => "exited",
            LifecycleState::Dead => "dead",
            LifecycleState::Removing => "removing",
            LifecycleState::Created => "created",
            LifecycleState::Restarting => "restarting",
            LifecycleState::Paused => "paused",
            LifecycleState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the container's own Docker healthcheck
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthFlag {
    Healthy,
    Unhealthy,
    Starting,
}

impl HealthFlag {
    /// Empty or unrecognised values mean "no healthcheck"
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "healthy" => Some(HealthFlag::Healthy),
            "unhealthy" => Some(HealthFlag::Unhealthy),
            "starting" => Some(HealthFlag::Starting),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthFlag::Healthy => "healthy",
            HealthFlag::Unhealthy => "unhealthy",
            HealthFlag::Starting => "starting",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    pub service: ServiceKey,
    pub container: Option<String>,
    pub state: LifecycleState,
    pub health: Option<HealthFlag>,
    pub exit_code: Option<i32>,
    /// Free text such as "Up 3 minutes (healthy)"
    pub status: Option<String>,
}

impl ServiceSnapshot {
    pub fn new(service: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            service: service.into(),
            container: None,
            state,
            health: None,
            exit_code: None,
            status: None,
        }
    }

    pub fn with_health(mut self, health: HealthFlag) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }
}

pub type SnapshotMap = BTreeMap<ServiceKey, ServiceSnapshot>;

/// Parse the output of `compose ps -a --format json`.
///
/// Accepts a single JSON array, newline-delimited objects, or a mix of both
/// (one array per line). Anything unparsable is dropped; a completely
/// unparsable output yields an empty map.
pub fn parse_snapshot_output(raw: &str) -> SnapshotMap {
    let trimmed = raw.trim();
    let mut rows: Vec<Value> = Vec::new();

    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            rows = items;
        }
    }

    if rows.is_empty() {
        for line in trimmed.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Array(items)) => rows.extend(items),
                Ok(value) => rows.push(value),
                Err(e) => tracing::debug!(error = %e, "skipping malformed snapshot line"),
            }
        }
    }

    let mut snapshots = SnapshotMap::new();
    for row in &rows {
        let Some(snapshot) = snapshot_from_row(row) else {
            tracing::debug!(row = %row, "skipping snapshot row without a service name");
            continue;
        };
        // Scaled services report several containers; a running one wins
        match snapshots.get(&snapshot.service) {
            Some(existing) if existing.is_running() && !snapshot.is_running() => {}
            _ => {
                snapshots.insert(snapshot.service.clone(), snapshot);
            }
        }
    }
    snapshots
}

fn snapshot_from_row(row: &Value) -> Option<ServiceSnapshot> {
    let object = row.as_object()?;
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| object.get(*name))
            .filter(|value| !value.is_null())
    };
    let text = |names: &[&str]| {
        field(names)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };

    let service = text(&["Service", "service"]).or_else(|| {
        object
            .get("Labels")
            .and_then(Value::as_str)
            .and_then(compose_service_label)
    })?;

    let state = text(&["State", "state"])
        .map(|s| LifecycleState::parse(&s))
        .unwrap_or(LifecycleState::Unknown);

    let exit_code = field(&["ExitCode", "exit_code", "exitCode"]).and_then(|value| match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    Some(ServiceSnapshot {
        service,
        container: text(&["Name", "name", "Names"]),
        state,
        health: text(&["Health", "health"]).and_then(|h| HealthFlag::parse(&h)),
        exit_code,
        status: text(&["Status", "status"]),
    })
}

/// Pull `com.docker.compose.service=<name>` out of a comma-separated label list
fn compose_service_label(labels: &str) -> Option<String> {
    labels.split(',').find_map(|pair| {
        pair.trim()
            .strip_prefix("com.docker.compose.service=")
            .map(str::to_owned)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let raw = r#"[
            {"Name":"stack-postgres-1","Service":"postgres","State":"running","Health":"healthy","ExitCode":0,"Status":"Up 2 minutes (healthy)"},
            {"Name":"stack-migrations-1","Service":"migrations","State":"exited","Health":"","ExitCode":0,"Status":"Exited (0) 1 minute ago"}
        ]"#;
        let map = parse_snapshot_output(raw);
        assert_eq!(map.len(), 2);

        let pg = &map["postgres"];
        assert_eq!(pg.container.as_deref(), Some("stack-postgres-1"));
        assert_eq!(pg.state, LifecycleState::Running);
        assert_eq!(pg.health, Some(HealthFlag::Healthy));

        let init = &map["migrations"];
        assert_eq!(init.state, LifecycleState::Exited);
        assert_eq!(init.health, None);
        assert_eq!(init.exit_code, Some(0));
    }

    #[test]
    fn test_parse_newline_delimited_objects() {
        let raw = concat!(
            r#"{"Service":"api","State":"running","Health":"starting"}"#,
            "\n",
            r#"{"Service":"web","State":"exited","ExitCode":"137"}"#,
            "\n"
        );
        let map = parse_snapshot_output(raw);
        assert_eq!(map["api"].health, Some(HealthFlag::Starting));
        assert_eq!(map["web"].exit_code, Some(137));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let raw = concat!(
            r#"{"Service":"api","State":"running"}"#,
            "\n",
            "WARN[0000] the attribute `version` is obsolete\n",
            r#"{"State":"running"}"#,
            "\n",
            r#"{"Service":"redis","State":"paused"}"#,
        );
        let map = parse_snapshot_output(raw);
        assert_eq!(map.len(), 2);
        assert_eq!(map["redis"].state, LifecycleState::Paused);
    }

    #[test]
    fn test_garbage_degrades_to_empty() {
        assert!(parse_snapshot_output("").is_empty());
        assert!(parse_snapshot_output("no containers here").is_empty());
        assert!(parse_snapshot_output("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_missing_fields_default_to_unknown() {
        let map = parse_snapshot_output(r#"{"Service":"qdrant"}"#);
        let snap = &map["qdrant"];
        assert_eq!(snap.state, LifecycleState::Unknown);
        assert_eq!(snap.health, None);
        assert_eq!(snap.exit_code, None);
        assert_eq!(snap.container, None);
    }

    #[test]
    fn test_service_from_labels() {
        let raw = r#"{"Labels":"com.docker.compose.project=stack,com.docker.compose.service=minio","State":"created"}"#;
        let map = parse_snapshot_output(raw);
        assert_eq!(map["minio"].state, LifecycleState::Created);
    }

    #[test]
    fn test_running_replica_wins() {
        let raw = concat!(
            r#"{"Service":"worker","Name":"w-1","State":"running"}"#,
            "\n",
            r#"{"Service":"worker","Name":"w-2","State":"exited","ExitCode":1}"#,
        );
        let map = parse_snapshot_output(raw);
        assert_eq!(map["worker"].container.as_deref(), Some("w-1"));
    }
}
