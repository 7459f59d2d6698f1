use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};

use stackwatch_core::catalog::Catalog;
use stackwatch_core::dashboard::DashboardView;

use crate::ui::Theme;

const KEY_HINTS: [(&str, &str); 6] = [
    ("↑↓", "select"),
    ("p", "pause"),
    ("o", "open"),
    ("u/r/s/d", "service"),
    ("U/D", "stack"),
    ("q", "quit"),
];

pub fn draw(
    frame: &mut Frame,
    view: &DashboardView,
    catalog: &Catalog,
    theme: &Theme,
    refresh: Duration,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
        .split(rows[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(3)])
        .split(body[1]);

    draw_header(frame, rows[0], view, theme, refresh);
    draw_services(frame, body[0], view, catalog, theme);
    draw_details(frame, right[0], view, catalog, theme);
    draw_logs(frame, right[1], view, theme);
    draw_footer(frame, rows[2], view, theme);
}

fn draw_header(
    frame: &mut Frame,
    area: Rect,
    view: &DashboardView,
    theme: &Theme,
    refresh: Duration,
) {
    let total = view.services.len();
    let ready = view
        .services
        .iter()
        .filter(|key| view.readiness.get(*key).is_some_and(|r| r.ready))
        .count();

    let mut spans = vec![
        Span::styled(" stack ", theme.section_header_style()),
        Span::styled(
            format!("{ready}/{total} ready · refresh {:.1}s", refresh.as_secs_f64()),
            theme.text_dim_style(),
        ),
    ];
    if view.paused {
        spans.push(Span::styled("  PAUSED", theme.warn_style()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_services(
    frame: &mut Frame,
    area: Rect,
    view: &DashboardView,
    catalog: &Catalog,
    theme: &Theme,
) {
    let rows: Vec<Row> = view
        .services
        .iter()
        .map(|key| {
            let snapshot = view.snapshots.get(key);
            let readiness = view.readiness.get(key);
            let state_label = snapshot.map(|s| s.state.as_str()).unwrap_or("missing");
            Row::new(vec![
                Cell::from(Line::from(vec![
                    Span::styled(theme.state_icon(snapshot), theme.state_style(snapshot)),
                    Span::raw(" "),
                    Span::styled(catalog.display_name(key).to_string(), theme.text_style()),
                ])),
                Cell::from(Span::styled(state_label, theme.state_style(snapshot))),
                Cell::from(Span::styled(
                    theme.readiness_label(readiness),
                    theme.readiness_style(readiness),
                )),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(12),
            Constraint::Length(10),
            Constraint::Length(9),
        ],
    )
    .header(Row::new(vec!["Service", "State", "Ready"]).style(theme.text_muted_style()))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.focused_border_style())
            .title(" Services "),
    )
    .row_highlight_style(theme.selection_style());

    let mut table_state = TableState::default();
    table_state.select(view.selected);
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn draw_details(
    frame: &mut Frame,
    area: Rect,
    view: &DashboardView,
    catalog: &Catalog,
    theme: &Theme,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.subtle_border_style())
        .title(" Details ");

    let Some(key) = view.selected_service() else {
        let empty = Paragraph::new("No services found.")
            .style(theme.text_muted_style())
            .block(block);
        frame.render_widget(empty, area);
        return;
    };

    let definition = catalog.get(key);
    let snapshot = view.snapshots.get(key);
    let readiness = view.readiness.get(key);
    let label = |text: &'static str| Span::styled(format!("{text:<9}"), theme.text_muted_style());

    let mut lines = vec![Line::from(vec![
        Span::styled(catalog.display_name(key).to_string(), theme.title_style()),
        Span::styled(format!("  ({key})"), theme.text_dim_style()),
    ])];

    if let Some(def) = definition {
        let mut kind = def.category.label().to_string();
        if def.one_shot {
            kind.push_str(", one-shot");
        }
        if catalog.is_core(key) {
            kind.push_str(", core");
        }
        lines.push(Line::from(vec![label("Kind"), Span::raw(kind)]));
        if let Some(description) = &def.description {
            lines.push(Line::from(vec![
                label("About"),
                Span::styled(description.clone(), theme.text_dim_style()),
            ]));
        }
    }

    let container = match snapshot {
        Some(snap) => {
            let mut text = snap.state.to_string();
            if let Some(code) = snap.exit_code {
                text.push_str(&format!(" (exit {code})"));
            }
            if let Some(status) = &snap.status {
                text.push_str(&format!(" · {status}"));
            }
            text
        }
        None => "not created".into(),
    };
    lines.push(Line::from(vec![
        label("State"),
        Span::styled(container, theme.state_style(snapshot)),
    ]));

    let health = snapshot.and_then(|s| s.health);
    lines.push(Line::from(vec![
        label("Health"),
        Span::styled(
            health.map(|h| h.as_str()).unwrap_or("no healthcheck"),
            theme.health_style(health),
        ),
    ]));

    let ready_text = match readiness {
        Some(r) => {
            let verdict = if r.ready { "ready" } else { "not ready" };
            format!("{verdict} via {}: {}", r.source, r.detail)
        }
        None => "not probed yet".into(),
    };
    lines.push(Line::from(vec![
        label("Ready"),
        Span::styled(ready_text, theme.readiness_style(readiness)),
    ]));

    if let Some(url) = definition.and_then(|def| def.urls.first()) {
        lines.push(Line::from(vec![
            label("URL"),
            Span::styled(url.clone(), theme.text_dim_style()),
        ]));
    }

    let details = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(details, area);
}

fn draw_logs(frame: &mut Frame, area: Rect, view: &DashboardView, theme: &Theme) {
    let title = match view.selected_service() {
        Some(key) => format!(" Logs: {key} "),
        None => " Logs ".into(),
    };

    // Show the tail that fits inside the borders
    let visible = area.height.saturating_sub(2) as usize;
    let all: Vec<&str> = view.logs_text.lines().collect();
    let tail = &all[all.len().saturating_sub(visible)..];
    let lines: Vec<Line> = tail.iter().map(|line| Line::raw(*line)).collect();

    let logs = Paragraph::new(Text::from(lines))
        .style(theme.text_dim_style())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.subtle_border_style())
                .title(title),
        );
    frame.render_widget(logs, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, view: &DashboardView, theme: &Theme) {
    let mut spans = Vec::new();
    for (key, action) in KEY_HINTS {
        spans.push(Span::styled(format!(" {key}"), theme.key_hint_style()));
        spans.push(Span::styled(format!(" {action} "), theme.text_muted_style()));
    }

    if let Some(error) = &view.last_error {
        spans.push(Span::styled(format!(" ✗ {error}"), theme.error_style()));
    } else if let Some(status) = &view.action_status {
        spans.push(Span::styled(format!(" {status}"), theme.warn_style()));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
