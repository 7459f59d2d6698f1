use std::process::ExitCode;

use anyhow::Context;

use stackwatch_core::runtime::StackRuntime;

use super::{BOLD, RESET};

pub async fn run(
    runtime: &dyn StackRuntime,
    service: Option<&str>,
    tail: usize,
) -> anyhow::Result<ExitCode> {
    let target = service.unwrap_or("all services");
    println!("{BOLD}Streaming logs for {target}{RESET} - press Ctrl+C to stop\n");

    tokio::select! {
        result = runtime.follow_logs(service, tail) => {
            result.with_context(|| format!("could not stream logs for {target}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
        }
    }
    Ok(ExitCode::SUCCESS)
}
