//! State shared between the dashboard workers and the render loop.
//!
//! The service list and the selection are private so the selection can be
//! kept in bounds on every change to the list. Reads clamp as well, so a
//! stale index can never fault.

use std::collections::BTreeMap;

use crate::catalog::ServiceKey;
use crate::readiness::ReadinessResult;
use crate::snapshot::SnapshotMap;

pub const LOADING_LOGS: &str = "Loading logs...";

#[derive(Debug)]
pub struct DashboardState {
    services: Vec<ServiceKey>,
    selected: usize,

    pub snapshots: SnapshotMap,
    pub readiness: BTreeMap<ServiceKey, ReadinessResult>,
    pub paused: bool,
    /// Log text of the selected service
    pub logs_text: String,
    logs_cache: BTreeMap<ServiceKey, String>,
    /// Last runtime error, cleared by the next good snapshot
    pub last_error: Option<String>,
    /// Progress or outcome of the last service action
    pub action_status: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            selected: 0,
            snapshots: SnapshotMap::new(),
            readiness: BTreeMap::new(),
            paused: false,
            logs_text: LOADING_LOGS.into(),
            logs_cache: BTreeMap::new(),
            last_error: None,
            action_status: None,
        }
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> &[ServiceKey] {
        &self.services
    }

    /// Replace the service list, keeping the same service selected when it
    /// is still present
    pub fn set_services(&mut self, mut services: Vec<ServiceKey>) {
        services.sort();
        services.dedup();

        let previous = self.selected_service().map(str::to_owned);
        self.services = services;

        match previous.and_then(|key| self.services.iter().position(|s| *s == key)) {
            Some(index) => self.selected = index,
            None => {
                self.selected = self.selected.min(self.services.len().saturating_sub(1));
                self.show_cached_logs();
            }
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        if self.services.is_empty() {
            None
        } else {
            Some(self.selected.min(self.services.len() - 1))
        }
    }

    pub fn selected_service(&self) -> Option<&str> {
        self.selected_index().map(|i| self.services[i].as_str())
    }

    /// Returns true when the selection actually changed
    pub fn select(&mut self, index: usize) -> bool {
        let Some(current) = self.selected_index() else {
            return false;
        };
        let index = index.min(self.services.len() - 1);
        if index == current {
            return false;
        }
        self.selected = index;
        self.show_cached_logs();
        true
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        match self.selected_index() {
            Some(current) => self.select(current.saturating_add_signed(delta)),
            None => false,
        }
    }

    pub fn publish_snapshot(&mut self, snapshots: SnapshotMap) {
        self.snapshots = snapshots;
        self.last_error = None;
    }

    pub fn publish_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn set_readiness(&mut self, key: &str, result: ReadinessResult) {
        self.readiness.insert(key.to_string(), result);
    }

    /// Store freshly fetched logs. They only become visible if `key` is
    /// still the selected service; returns whether that was the case.
    pub fn commit_logs(&mut self, key: &str, text: String) -> bool {
        self.logs_cache.insert(key.to_string(), text.clone());
        if self.selected_service() == Some(key) {
            self.logs_text = text;
            true
        } else {
            false
        }
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// Owned copy of what a frame needs, so drawing happens without the lock
    pub fn view(&self) -> DashboardView {
        DashboardView {
            services: self.services.clone(),
            selected: self.selected_index(),
            snapshots: self.snapshots.clone(),
            readiness: self.readiness.clone(),
            paused: self.paused,
            logs_text: self.logs_text.clone(),
            last_error: self.last_error.clone(),
            action_status: self.action_status.clone(),
        }
    }

    fn show_cached_logs(&mut self) {
        self.logs_text = self
            .selected_service()
            .and_then(|key| self.logs_cache.get(key))
            .cloned()
            .unwrap_or_else(|| LOADING_LOGS.into());
    }
}

/// One frame's worth of [`DashboardState`]
#[derive(Clone, Debug, Default)]
pub struct DashboardView {
    pub services: Vec<ServiceKey>,
    pub selected: Option<usize>,
    pub snapshots: SnapshotMap,
    pub readiness: BTreeMap<ServiceKey, ReadinessResult>,
    pub paused: bool,
    pub logs_text: String,
    pub last_error: Option<String>,
    pub action_status: Option<String>,
}

impl DashboardView {
    pub fn selected_service(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.services.get(i))
            .map(String::as_str)
    }
}

/// Stable-sorted union of every source of service keys
pub fn merge_services<'a>(sources: impl IntoIterator<Item = &'a ServiceKey>) -> Vec<ServiceKey> {
    let mut merged: Vec<ServiceKey> = sources.into_iter().cloned().collect();
    merged.sort();
    merged.dedup();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<ServiceKey> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_state_has_no_selection() {
        let mut state = DashboardState::new();
        assert_eq!(state.selected_index(), None);
        assert_eq!(state.selected_service(), None);
        assert!(!state.move_selection(1));
        assert!(!state.select(3));
    }

    #[test]
    fn test_services_sorted_and_deduplicated() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["redis", "api", "redis", "db"]));
        assert_eq!(state.services(), keys(&["api", "db", "redis"]).as_slice());
    }

    #[test]
    fn test_move_selection_clamps() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["a", "b", "c"]));
        assert!(!state.move_selection(-1));
        assert!(state.move_selection(5));
        assert_eq!(state.selected_service(), Some("c"));
        assert!(!state.move_selection(1));
        assert!(state.move_selection(-1));
        assert_eq!(state.selected_service(), Some("b"));
    }

    #[test]
    fn test_selection_clamped_after_list_shrinks() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["a", "b", "c", "d", "e"]));
        state.select(4);
        state.set_services(keys(&["a", "b"]));
        assert_eq!(state.selected_index(), Some(1));
        assert_eq!(state.selected_service(), Some("b"));

        state.set_services(Vec::new());
        assert_eq!(state.selected_service(), None);

        state.set_services(keys(&["x"]));
        assert_eq!(state.selected_service(), Some("x"));
    }

    #[test]
    fn test_selection_follows_service_when_list_grows() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["db", "web"]));
        state.select(1);
        state.set_services(keys(&["api", "db", "web"]));
        assert_eq!(state.selected_service(), Some("web"));
    }

    #[test]
    fn test_stale_logs_are_cached_not_shown() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["api", "db"]));
        assert!(state.commit_logs("api", "api up".into()));
        assert!(!state.commit_logs("db", "db up".into()));
        assert_eq!(state.logs_text, "api up");

        state.select(1);
        assert_eq!(state.logs_text, "db up");
        state.select(0);
        assert_eq!(state.logs_text, "api up");
    }

    #[test]
    fn test_uncached_selection_shows_loading() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["api", "db"]));
        state.commit_logs("api", "hello".into());
        state.select(1);
        assert_eq!(state.logs_text, LOADING_LOGS);
    }

    #[test]
    fn test_good_snapshot_clears_error() {
        let mut state = DashboardState::new();
        state.publish_error("docker daemon not running");
        assert!(state.last_error.is_some());
        state.publish_snapshot(SnapshotMap::new());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_view_copies_visible_fields() {
        let mut state = DashboardState::new();
        state.set_services(keys(&["api", "db"]));
        state.select(1);
        state.commit_logs("db", "db up".into());
        state.publish_error("daemon gone");
        state.toggle_pause();

        let view = state.view();
        state.set_services(Vec::new());

        assert_eq!(view.services, keys(&["api", "db"]));
        assert_eq!(view.selected_service(), Some("db"));
        assert_eq!(view.logs_text, "db up");
        assert_eq!(view.last_error.as_deref(), Some("daemon gone"));
        assert!(view.paused);
        assert_eq!(DashboardView::default().selected_service(), None);
    }

    #[test]
    fn test_merge_services() {
        let discovered = keys(&["web", "api"]);
        let catalog = keys(&["api", "db"]);
        let merged = merge_services(discovered.iter().chain(catalog.iter()));
        assert_eq!(merged, keys(&["api", "db", "web"]));
    }
}
