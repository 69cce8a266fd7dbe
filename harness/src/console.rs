//! Human-readable echo of external steps.

use pipeline::{CommandOutput, Invocation};

const RULE_WIDTH: usize = 60;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Print a separator banner around `title`
pub fn banner(title: &str) {
    println!("\n{}", rule());
    println!("{}", title);
    println!("{}", rule());
}

/// Banner plus the full command line about to run
pub fn announce(description: &str, invocation: &Invocation) {
    banner(description);
    println!("Command: {}", invocation.command_line());
}

/// Echo captured streams verbatim and an OK/error marker
pub fn echo_output(output: &CommandOutput) {
    if !output.stdout.is_empty() {
        println!("STDOUT: {}", output.stdout);
    }
    if !output.stderr.is_empty() {
        println!("STDERR: {}", output.stderr);
    }
    match output.exit_code {
        Some(0) => println!("[OK] Success"),
        Some(code) => println!("[X] Error (exit code {})", code),
        None => println!("[X] Error (terminated by signal)"),
    }
}

/// Echo a failure that happened before any output existed
pub fn echo_error(error: &dyn std::fmt::Display) {
    println!("[X] {}", error);
}
