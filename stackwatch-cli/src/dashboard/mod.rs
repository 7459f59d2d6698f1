//! Live terminal dashboard
//!
//! The foreground task reads keys and draws; three background workers keep
//! snapshots, readiness and logs fresh (see [`workers`]).

mod input;
mod render;
mod terminal;
mod workers;

use std::process::{ExitCode, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use ratatui::{Terminal, backend::Backend};

use stackwatch_core::catalog::Catalog;
use stackwatch_core::dashboard::DashboardState;
use stackwatch_core::probe::{Probe, ProbeTimeouts};
use stackwatch_core::runtime::StackRuntime;

use crate::ui::Theme;
use input::{Action, InputReader, Job};
use terminal::TerminalGuard;
use workers::Shared;

const MAX_FPS: f64 = 24.0;
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const MIN_REFRESH: Duration = Duration::from_millis(500);

pub struct DashboardOptions {
    pub refresh: Duration,
    pub tail_lines: usize,
    pub probe_timeouts: ProbeTimeouts,
}

pub async fn run(
    runtime: Arc<dyn StackRuntime>,
    probe: Arc<dyn Probe>,
    catalog: Arc<Catalog>,
    options: DashboardOptions,
) -> anyhow::Result<ExitCode> {
    let refresh = options.refresh.max(MIN_REFRESH);

    let mut initial = DashboardState::new();
    initial.set_services(catalog.keys().cloned().collect());
    let shared = Shared::new(initial);

    tracing::info!(refresh_ms = refresh.as_millis() as u64, "dashboard started");
    let handles = vec![
        tokio::spawn(workers::snapshot_worker(
            shared.clone(),
            runtime.clone(),
            catalog.clone(),
            refresh,
        )),
        tokio::spawn(workers::probe_worker(
            shared.clone(),
            probe,
            catalog.clone(),
            options.probe_timeouts,
        )),
        tokio::spawn(workers::logs_worker(
            shared.clone(),
            runtime.clone(),
            options.tail_lines,
        )),
    ];

    let result = event_loop(&shared, &runtime, &catalog, refresh).await;

    shared.stop();
    for handle in handles {
        if tokio::time::timeout(WORKER_JOIN_TIMEOUT, handle).await.is_err() {
            tracing::warn!("dashboard worker did not stop in time");
        }
    }
    tracing::info!("dashboard stopped");

    result.map(|()| ExitCode::SUCCESS)
}

async fn event_loop(
    shared: &Arc<Shared>,
    runtime: &Arc<dyn StackRuntime>,
    catalog: &Catalog,
    refresh: Duration,
) -> anyhow::Result<()> {
    let mut guard = TerminalGuard::enter().context("could not take over the terminal")?;
    let mut input = InputReader::spawn();
    let theme = Theme::default();
    let frame_interval = Duration::from_secs_f64(1.0 / MAX_FPS);
    let action_running = Arc::new(AtomicBool::new(false));

    let mut last_draw: Option<Instant> = None;

    loop {
        let frame_due = last_draw.is_none_or(|at| at.elapsed() >= frame_interval);
        if frame_due && redraw(guard.terminal(), shared, catalog, &theme, refresh).await? {
            last_draw = Some(Instant::now());
        }

        let Some(key) = input.next_key(frame_interval).await else {
            continue;
        };
        let Some(action) = Action::from_key(&key) else {
            continue;
        };

        match action {
            Action::Quit => break,
            Action::MoveUp | Action::MoveDown => {
                let delta = if action == Action::MoveUp { -1 } else { 1 };
                if shared.state.write().await.move_selection(delta) {
                    shared.request_probe();
                    shared.reset_logs_timer();
                    shared.mark_changed();
                }
            }
            Action::TogglePause => {
                shared.state.write().await.toggle_pause();
                shared.mark_changed();
            }
            Action::OpenUrl => {
                let selected = shared.state.read().await.selected_service().map(str::to_owned);
                let url = selected
                    .as_deref()
                    .and_then(|key| catalog.get(key))
                    .and_then(|def| def.urls.first().cloned());
                let status = match (selected, url) {
                    (_, Some(url)) => match open_url(&url) {
                        Ok(()) => format!("Opened {url}"),
                        Err(e) => format!("Could not open {url}: {e}"),
                    },
                    (Some(key), None) => format!("{key} has no URL"),
                    (None, None) => "No service selected".into(),
                };
                shared.state.write().await.action_status = Some(status);
                shared.mark_changed();
            }
            Action::Run(job) => {
                start_job(job, shared, runtime, &action_running).await;
            }
        }
    }

    Ok(())
}

/// Draw one frame if anything changed and the dashboard is not paused.
/// The state is copied out first so the lock is free while the terminal
/// is written.
async fn redraw<B: Backend>(
    terminal: &mut Terminal<B>,
    shared: &Shared,
    catalog: &Catalog,
    theme: &Theme,
    refresh: Duration,
) -> anyhow::Result<bool> {
    if !shared.take_changed() {
        return Ok(false);
    }
    let view = shared.state.read().await.view();
    if view.paused {
        return Ok(false);
    }
    terminal
        .draw(|frame| render::draw(frame, &view, catalog, theme, refresh))
        .context("could not draw the dashboard")?;
    Ok(true)
}

/// Run a stack or service operation in the background, one at a time
async fn start_job(
    job: Job,
    shared: &Arc<Shared>,
    runtime: &Arc<dyn StackRuntime>,
    running: &Arc<AtomicBool>,
) {
    let target = shared.state.read().await.selected_service().map(str::to_owned);
    if matches!(job, Job::Service(_)) && target.is_none() {
        shared.state.write().await.action_status = Some("No service selected".into());
        shared.mark_changed();
        return;
    }

    if running.swap(true, Ordering::AcqRel) {
        shared.state.write().await.action_status = Some("Action already running...".into());
        shared.mark_changed();
        return;
    }

    let label = job.label();
    let subject = match job {
        Job::Service(_) => target.clone().unwrap_or_default(),
        Job::StackUp | Job::StackDown => "stack".into(),
    };
    shared.state.write().await.action_status = Some(format!("{label} {subject}..."));
    shared.mark_changed();

    let shared = shared.clone();
    let runtime = runtime.clone();
    let running = running.clone();
    tokio::spawn(async move {
        let result = match (job, target.as_deref()) {
            (Job::Service(action), Some(key)) => runtime.service_action(action, key).await,
            (Job::StackDown, _) => runtime.tear_down(true).await,
            _ => runtime.bring_up().await,
        };

        let status = match result {
            Ok(()) => format!("{label} {subject} done"),
            Err(e) => {
                tracing::warn!(error = %e, action = label, "dashboard action failed");
                format!("{label} {subject} failed: {e}")
            }
        };
        shared.state.write().await.action_status = Some(status);
        running.store(false, Ordering::Release);
        shared.request_probe();
        shared.mark_changed();
    });
}

/// Hand a URL to the desktop's default opener without waiting for it
fn open_url(url: &str) -> std::io::Result<()> {
    let program = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let mut child = tokio::process::Command::new(program)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(())
}
