use std::process::ExitCode;

use anyhow::Context;

use stackwatch_core::orchestrator::{Orchestrator, StatusRow};

use super::{BOLD, DIM, GREEN, RED, RESET, YELLOW};

pub async fn run(orchestrator: &Orchestrator, json: bool) -> anyhow::Result<ExitCode> {
    let rows = orchestrator
        .status()
        .await
        .context("could not read the stack status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(ExitCode::SUCCESS);
    }

    print_table(&rows);
    Ok(ExitCode::SUCCESS)
}

fn print_table(rows: &[StatusRow]) {
    let name_width = column_width("SERVICE", rows.iter().map(|r| r.display_name.as_str()));
    let state_width = column_width("STATE", rows.iter().map(|r| r.state.as_str()));
    let health_width = column_width("HEALTH", rows.iter().map(|r| r.health.as_str()));

    println!(
        "{BOLD}  {:name_width$}  {:state_width$}  {:health_width$}  {:5}  {:13}  DETAIL{RESET}",
        "SERVICE", "STATE", "HEALTH", "READY", "SOURCE"
    );

    for row in rows {
        let (icon, color) = if row.ready {
            ("✓", GREEN)
        } else if row.state == "not created" {
            ("○", DIM)
        } else if row.health == "unhealthy" || matches!(row.state.as_str(), "dead" | "removing") {
            ("✗", RED)
        } else {
            ("…", YELLOW)
        };
        println!(
            "{color}{icon}{RESET} {:name_width$}  {:state_width$}  {:health_width$}  {color}{:5}{RESET}  {:13}  {DIM}{}{RESET}",
            row.display_name,
            row.state,
            row.health,
            if row.ready { "yes" } else { "no" },
            row.source.as_str(),
            row.detail,
        );
    }

    let ready = rows.iter().filter(|r| r.ready).count();
    println!("\n{ready}/{} services ready", rows.len());
}

fn column_width<'a>(header: &str, values: impl Iterator<Item = &'a str>) -> usize {
    values
        .map(|v| v.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
}
