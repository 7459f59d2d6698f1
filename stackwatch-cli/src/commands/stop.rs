use std::process::ExitCode;

use stackwatch_core::orchestrator::Orchestrator;

use super::{BOLD, RESET, print_fail, print_hint, print_ok};

pub async fn run(orchestrator: &Orchestrator, remove_volumes: bool) -> anyhow::Result<ExitCode> {
    println!("{BOLD}Stopping stack...{RESET}\n");

    match orchestrator.stop(remove_volumes).await {
        Ok(()) => {
            if remove_volumes {
                print_ok("Stack stopped, volumes removed");
            } else {
                print_ok("Stack stopped");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_fail(format!("Stop failed: {e}"));
            if let Some(code) = e.exit_code() {
                print_hint(format!("exit code: {code}"));
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
