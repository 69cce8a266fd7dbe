use serde::{Deserialize, Serialize};

/// Why a target did not pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The declared test source does not exist; the compiler was not invoked
    MissingSource { path: String },
    /// The compiler ran and returned non-zero
    CompileFailed { exit_code: Option<i32> },
    /// The compiler or the artifact could not be started
    LaunchFailed { message: String },
    /// The artifact ran and returned non-zero
    TestsFailed { exit_code: Option<i32> },
    /// A compile or test run exceeded its timeout
    TimedOut { stage: Stage, timeout_secs: u64 },
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::MissingSource { path } => write!(f, "missing test source {}", path),
            FailureKind::CompileFailed { exit_code } => {
                write!(f, "compilation failed (exit {})", display_code(*exit_code))
            }
            FailureKind::LaunchFailed { message } => write!(f, "launch failed: {}", message),
            FailureKind::TestsFailed { exit_code } => {
                write!(f, "tests failed (exit {})", display_code(*exit_code))
            }
            FailureKind::TimedOut {
                stage,
                timeout_secs,
            } => write!(f, "{} timed out after {}s", stage, timeout_secs),
        }
    }
}

fn display_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Run,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Compile => write!(f, "compile"),
            Stage::Run => write!(f, "run"),
        }
    }
}

/// Outcome of compiling and running one target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub target_name: String,
    pub compiled: bool,
    pub ran: bool,
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// A result that never reached the compiler or failed inside it
    pub fn not_compiled(target_name: impl Into<String>, failure: FailureKind) -> Self {
        Self {
            target_name: target_name.into(),
            compiled: false,
            ran: false,
            passed: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            failure: Some(failure),
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// Percentages extracted from the coverage tool's summary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoverageSummary {
    pub line_pct: f64,
    pub function_pct: f64,
    pub branch_pct: f64,
    pub raw_text: String,
}

/// Minimum coverage the gate enforces.
///
/// Branch coverage is reported alongside but has no minimum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdPolicy {
    pub min_line_pct: f64,
    pub min_function_pct: f64,
}

impl ThresholdPolicy {
    pub const STANDARD: ThresholdPolicy = ThresholdPolicy {
        min_line_pct: 80.0,
        min_function_pct: 90.0,
    };

    pub fn evaluate(&self, summary: &CoverageSummary) -> GateVerdict {
        GateVerdict {
            line_ok: summary.line_pct >= self.min_line_pct,
            function_ok: summary.function_pct >= self.min_function_pct,
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    pub line_ok: bool,
    pub function_ok: bool,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.line_ok && self.function_ok
    }

    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(line_pct: f64, function_pct: f64) -> CoverageSummary {
        CoverageSummary {
            line_pct,
            function_pct,
            ..CoverageSummary::default()
        }
    }

    #[test]
    fn test_standard_thresholds() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.min_line_pct, 80.0);
        assert_eq!(policy.min_function_pct, 90.0);
    }

    #[test]
    fn test_gate_line_below_minimum() {
        let verdict = ThresholdPolicy::STANDARD.evaluate(&summary(79.9, 95.0));
        assert!(!verdict.line_ok);
        assert!(verdict.function_ok);
        assert!(!verdict.passed());
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_gate_both_met() {
        let verdict = ThresholdPolicy::STANDARD.evaluate(&summary(85.0, 91.0));
        assert!(verdict.passed());
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn test_gate_function_below_minimum() {
        let verdict = ThresholdPolicy::STANDARD.evaluate(&summary(85.0, 89.9));
        assert!(verdict.line_ok);
        assert!(!verdict.function_ok);
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_gate_exact_minimums_pass() {
        let verdict = ThresholdPolicy::STANDARD.evaluate(&summary(80.0, 90.0));
        assert!(verdict.passed());
    }

    #[test]
    fn test_gate_ignores_branch_coverage() {
        let mut low_branches = summary(85.0, 95.0);
        low_branches.branch_pct = 0.0;
        assert!(ThresholdPolicy::STANDARD.evaluate(&low_branches).passed());
    }

    #[test]
    fn test_failure_kind_display() {
        let missing = FailureKind::MissingSource {
            path: "test/unit/test_rect/test_rect.cpp".to_string(),
        };
        assert_eq!(
            missing.to_string(),
            "missing test source test/unit/test_rect/test_rect.cpp"
        );

        let signalled = FailureKind::TestsFailed { exit_code: None };
        assert_eq!(signalled.to_string(), "tests failed (exit signal)");

        let timed_out = FailureKind::TimedOut {
            stage: Stage::Run,
            timeout_secs: 60,
        };
        assert_eq!(timed_out.to_string(), "run timed out after 60s");
    }

    #[test]
    fn test_failure_kind_serialization() {
        let failure = FailureKind::CompileFailed { exit_code: Some(1) };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "compile_failed");
        assert_eq!(json["exit_code"], 1);
    }

    #[test]
    fn test_not_compiled_result() {
        let result = ExecutionResult::not_compiled(
            "Core-Rect",
            FailureKind::MissingSource {
                path: "missing.cpp".to_string(),
            },
        );
        assert!(!result.compiled);
        assert!(!result.ran);
        assert!(!result.passed);
        assert!(result.failure.is_some());
    }
}
