//! Runs one compiled test artifact and classifies the outcome.
//!
//! Exit code 0 passes, anything else fails. A launch failure or a timeout
//! becomes a failed [`ExecutionResult`]; nothing here returns an error, so a
//! broken artifact can never abort the batch.

use crate::console;
use pipeline::{CommandRunner, ExecutionResult, FailureKind, Invocation, ProcessError, Stage};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub async fn run_artifact(
    runner: &dyn CommandRunner,
    target_name: &str,
    artifact: &Path,
    timeout: Duration,
) -> ExecutionResult {
    let invocation = Invocation::new(artifact.display().to_string()).with_timeout(timeout);

    println!("\n>> Running {}...", target_name);
    console::announce(&format!("Tests: {}", target_name), &invocation);

    let mut result = ExecutionResult {
        target_name: target_name.to_string(),
        compiled: true,
        ran: false,
        passed: false,
        stdout: String::new(),
        stderr: String::new(),
        exit_code: None,
        failure: None,
    };

    match runner.run(&invocation).await {
        Ok(output) => {
            console::echo_output(&output);
            result.ran = true;
            result.passed = output.success();
            result.exit_code = output.exit_code;
            if !result.passed {
                result.failure = Some(FailureKind::TestsFailed {
                    exit_code: output.exit_code,
                });
            }
            result.stdout = output.stdout;
            result.stderr = output.stderr;
            info!("{}: tests {}", target_name, if result.passed { "passed" } else { "failed" });
        }
        Err(ProcessError::Timeout { timeout, .. }) => {
            warn!("{}: test binary timed out after {:?}", target_name, timeout);
            console::echo_error(&format!("Timed out after {}s", timeout.as_secs()));
            result.ran = true;
            result.failure = Some(FailureKind::TimedOut {
                stage: Stage::Run,
                timeout_secs: timeout.as_secs(),
            });
        }
        Err(e) => {
            warn!("{}: could not launch test binary: {}", target_name, e);
            console::echo_error(&e);
            result.stderr = e.to_string();
            result.failure = Some(FailureKind::LaunchFailed {
                message: e.to_string(),
            });
        }
    }

    result
}
