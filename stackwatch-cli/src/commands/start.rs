use std::process::ExitCode;

use stackwatch_core::orchestrator::{Orchestrator, StartOutcome};
use stackwatch_core::snapshot::ServiceSnapshot;

use super::{BOLD, DIM, RESET, print_fail, print_hint, print_ok, print_warn};

pub async fn run(orchestrator: &Orchestrator) -> anyhow::Result<ExitCode> {
    println!("{BOLD}Starting stack...{RESET}\n");

    let outcome = match orchestrator.start().await {
        Ok(outcome) => outcome,
        Err(e) => {
            print_fail(format!("Bring-up failed: {e}"));
            if let Some(command) = e.command() {
                print_hint(format!("command: {command}"));
            }
            if let Some(code) = e.exit_code() {
                print_hint(format!("exit code: {code}"));
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    let catalog = orchestrator.catalog();
    match outcome {
        StartOutcome::Ready { services, elapsed } => {
            for key in &services {
                print_ok(catalog.display_name(key));
            }
            println!("\n{BOLD}Stack ready{RESET} in {:.1}s\n", elapsed.as_secs_f64());
            Ok(ExitCode::SUCCESS)
        }
        StartOutcome::Failed { services } => {
            for snapshot in &services {
                print_fail(format!(
                    "{}: {}",
                    catalog.display_name(&snapshot.service),
                    describe(snapshot)
                ));
            }

            for snapshot in &services {
                println!("\n{BOLD}Last logs of {}{RESET}", snapshot.service);
                match orchestrator.error_logs(&snapshot.service).await {
                    Ok(text) if text.trim().is_empty() => println!("{DIM}(no output){RESET}"),
                    Ok(text) => {
                        for line in text.lines() {
                            println!("{DIM}│{RESET} {line}");
                        }
                    }
                    Err(e) => print_warn(format!("could not read logs: {e}")),
                }
            }
            println!();
            print_fail("Stack is up but some services are in error");
            print_hint("fix them, then run `stack start` again");
            println!();
            Ok(ExitCode::SUCCESS)
        }
        StartOutcome::TimedOut { pending } => {
            print_warn("Timed out waiting for the stack to become ready");
            for (key, result) in &pending {
                println!(
                    "    {} {DIM}({}: {}){RESET}",
                    catalog.display_name(key),
                    result.source,
                    result.detail
                );
            }
            println!("\nServices may still be starting. Check on them manually:");
            println!("    stack status");
            println!("    stack logs <service>\n");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn describe(snapshot: &ServiceSnapshot) -> String {
    let mut text = snapshot.state.to_string();
    if let Some(code) = snapshot.exit_code {
        text.push_str(&format!(" (exit {code})"));
    }
    if let Some(health) = snapshot.health {
        text.push_str(&format!(", {}", health.as_str()));
    }
    text
}
