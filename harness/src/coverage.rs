//! Coverage measurement and gate.
//!
//! The pipeline is a strict sequence where each step gates the next:
//!
//! 1. run the suite through the test-runner integration (skippable)
//! 2. `lcov --capture` the raw counters
//! 3. `lcov --remove` system, dependency, test and library sources
//! 4. parse `lcov --summary` for line/function/branch percentages
//! 5. compare line and function coverage against [`ThresholdPolicy`]
//! 6. render an HTML report with `genhtml` (only when asked)
//!
//! Steps 1-3 are fail-fast and surface as [`CoverageError`]. Steps 5 and 6
//! are advisory: a report failure never changes the gate verdict.
//!
//! [`clean`] is the maintenance mode that deletes the intermediate files.

use crate::console;
use pipeline::{
    CommandOutput, CommandRunner, CoverageSummary, GateVerdict, Invocation, PipelineConfig,
    ProcessError, ThresholdPolicy,
};
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Test suite failed (exit {exit_code:?})")]
    TestsFailed { exit_code: Option<i32> },

    #[error("{step} failed (exit {exit_code:?})")]
    StepFailed {
        step: &'static str,
        exit_code: Option<i32>,
    },

    #[error("{step} could not run: {source}")]
    Tool {
        step: &'static str,
        #[source]
        source: ProcessError,
    },
}

pub type CoverageResult<T> = Result<T, CoverageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageOptions {
    /// Run the suite before capturing counters
    pub run_tests: bool,
    /// Render the HTML report after the summary
    pub html_report: bool,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            run_tests: true,
            html_report: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    NotRequested,
    Generated { index: PathBuf },
    Failed { reason: String },
}

/// Everything a completed coverage invocation measured and decided
#[derive(Debug, Clone, Serialize)]
pub struct CoverageRun {
    pub summary: CoverageSummary,
    pub policy: ThresholdPolicy,
    pub verdict: GateVerdict,
    pub report: ReportStatus,
}

impl CoverageRun {
    pub fn exit_code(&self) -> u8 {
        self.verdict.exit_code()
    }
}

pub struct CoveragePipeline<'a> {
    config: &'a PipelineConfig,
    runner: &'a dyn CommandRunner,
    policy: ThresholdPolicy,
}

impl<'a> CoveragePipeline<'a> {
    pub fn new(config: &'a PipelineConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            policy: ThresholdPolicy::STANDARD,
        }
    }

    pub async fn run(&self, options: CoverageOptions) -> CoverageResult<CoverageRun> {
        if options.run_tests {
            println!("\nRunning tests...");
            let output = self.step("run tests", "RUNNING TESTS", self.test_invocation()).await?;
            if !output.success() {
                println!("\n[X] Tests failed");
                return Err(CoverageError::TestsFailed {
                    exit_code: output.exit_code,
                });
            }
            println!("\n[OK] Tests passed");
        }

        println!("\nGenerating coverage data...");
        self.required_step("capture", "CAPTURING COVERAGE DATA", self.capture_invocation())
            .await?;
        self.required_step("filter", "FILTERING COVERAGE DATA", self.filter_invocation())
            .await?;

        let summary = self.summarize().await;
        print_summary(&summary, &self.policy);

        let report = if options.html_report {
            self.render_html().await
        } else {
            ReportStatus::NotRequested
        };

        let verdict = self.policy.evaluate(&summary);
        print_verdict(&verdict, &self.policy);
        info!(
            "Coverage gate {}: lines {:.2}%, functions {:.2}%",
            if verdict.passed() { "passed" } else { "failed" },
            summary.line_pct,
            summary.function_pct
        );

        Ok(CoverageRun {
            summary,
            policy: self.policy,
            verdict,
            report,
        })
    }

    fn tool(&self, program: &str) -> Invocation {
        Invocation::new(program)
            .current_dir(&self.config.root)
            .with_timeout(self.config.coverage.tool_timeout())
    }

    pub fn test_invocation(&self) -> Invocation {
        let command = &self.config.coverage.test_command;
        let program = command.first().map(String::as_str).unwrap_or_default();
        self.tool(program).args(command.iter().skip(1).cloned())
    }

    pub fn capture_invocation(&self) -> Invocation {
        let coverage = &self.config.coverage;
        self.tool(&coverage.lcov)
            .args(["--capture", "--directory", "."])
            .arg("--output-file")
            .path_arg(&coverage.raw_report)
    }

    pub fn filter_invocation(&self) -> Invocation {
        let coverage = &self.config.coverage;
        self.tool(&coverage.lcov)
            .arg("--remove")
            .path_arg(&coverage.raw_report)
            .args(coverage.exclude_patterns.iter().cloned())
            .arg("--output-file")
            .path_arg(&coverage.filtered_report)
    }

    pub fn summary_invocation(&self) -> Invocation {
        let coverage = &self.config.coverage;
        self.tool(&coverage.lcov)
            .arg("--summary")
            .path_arg(&coverage.filtered_report)
    }

    pub fn report_invocation(&self) -> Invocation {
        let coverage = &self.config.coverage;
        self.tool(&coverage.genhtml)
            .path_arg(&coverage.filtered_report)
            .arg("--output-directory")
            .path_arg(&coverage.report_dir)
    }

    async fn step(
        &self,
        step: &'static str,
        description: &str,
        invocation: Invocation,
    ) -> CoverageResult<CommandOutput> {
        console::announce(description, &invocation);
        match self.runner.run(&invocation).await {
            Ok(output) => {
                console::echo_output(&output);
                Ok(output)
            }
            Err(source) => {
                console::echo_error(&source);
                Err(CoverageError::Tool { step, source })
            }
        }
    }

    async fn required_step(
        &self,
        step: &'static str,
        description: &str,
        invocation: Invocation,
    ) -> CoverageResult<CommandOutput> {
        let output = self.step(step, description, invocation).await?;
        if !output.success() {
            println!("\n[X] Error generating coverage data");
            return Err(CoverageError::StepFailed {
                step,
                exit_code: output.exit_code,
            });
        }
        Ok(output)
    }

    /// Never fails: unreadable output parses as zero coverage
    async fn summarize(&self) -> CoverageSummary {
        let invocation = self.summary_invocation();
        debug!("Reading coverage summary: {}", invocation.command_line());
        match self.runner.run(&invocation).await {
            Ok(output) => {
                // lcov prints the summary on stderr; older versions use stdout.
                let text = if output.stderr.is_empty() {
                    &output.stdout
                } else {
                    &output.stderr
                };
                parse_summary(text)
            }
            Err(e) => {
                warn!("Could not read coverage summary: {}", e);
                parse_summary("")
            }
        }
    }

    async fn render_html(&self) -> ReportStatus {
        println!("\nGenerating HTML report...");
        let report_dir = self.config.resolve(&self.config.coverage.report_dir);
        if let Err(e) = std::fs::create_dir_all(&report_dir) {
            warn!("Could not create {}: {}", report_dir.display(), e);
            return ReportStatus::Failed {
                reason: e.to_string(),
            };
        }

        let status = match self
            .step("report", "GENERATING HTML REPORT", self.report_invocation())
            .await
        {
            Ok(output) if output.success() => {
                let index = report_dir.join("index.html");
                println!("\n[OK] HTML report generated at: {}", index.display());
                println!("   Open it in a browser for the detailed report");
                ReportStatus::Generated { index }
            }
            Ok(output) => ReportStatus::Failed {
                reason: format!("genhtml exited with {:?}", output.exit_code),
            },
            Err(e) => ReportStatus::Failed {
                reason: e.to_string(),
            },
        };

        if let ReportStatus::Failed { reason } = &status {
            warn!("HTML report not generated: {}", reason);
            println!("\n[!] HTML report not generated: {}", reason);
        }
        status
    }
}

/// Extract line, function and branch percentages from `lcov --summary`
/// output. Any field that cannot be found is `0.0`.
pub fn parse_summary(text: &str) -> CoverageSummary {
    CoverageSummary {
        line_pct: extract_percentage(text, "lines"),
        function_pct: extract_percentage(text, "functions"),
        branch_pct: extract_percentage(text, "branches"),
        raw_text: text.to_string(),
    }
}

fn extract_percentage(text: &str, label: &str) -> f64 {
    let pattern = format!(r"\b{}\.*:\s*(\d+\.?\d*)%", regex::escape(label));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

fn print_summary(summary: &CoverageSummary, policy: &ThresholdPolicy) {
    console::banner("COVERAGE REPORT");
    println!(
        "Line Coverage:      {:6.2}%  (minimum: {}%)",
        summary.line_pct, policy.min_line_pct
    );
    println!(
        "Function Coverage:  {:6.2}%  (minimum: {}%)",
        summary.function_pct, policy.min_function_pct
    );
    if summary.branch_pct > 0.0 {
        println!("Branch Coverage:    {:6.2}%", summary.branch_pct);
    }
    println!("{}", console::rule());
}

fn print_verdict(verdict: &GateVerdict, policy: &ThresholdPolicy) {
    if verdict.line_ok {
        println!("\n[OK] Line coverage OK");
    } else {
        println!(
            "\n[X] Line coverage below the minimum ({}%)",
            policy.min_line_pct
        );
    }
    if verdict.function_ok {
        println!("[OK] Function coverage OK");
    } else {
        println!(
            "[X] Function coverage below the minimum ({}%)",
            policy.min_function_pct
        );
    }

    console::banner(if verdict.passed() {
        "COVERAGE MEETS THE REQUIREMENTS"
    } else {
        "COVERAGE DOES NOT MEET THE MINIMUM REQUIREMENTS"
    });
}

/// Delete the raw and filtered reports and every counter file matching the
/// configured patterns at the working-tree root. Errors are ignored; the
/// number of files actually removed is returned.
pub fn clean(config: &PipelineConfig) -> usize {
    let coverage = &config.coverage;
    let mut removed = 0;

    for report in [&coverage.raw_report, &coverage.filtered_report] {
        if std::fs::remove_file(config.resolve(report)).is_ok() {
            removed += 1;
        }
    }

    let root = glob::Pattern::escape(&config.root.display().to_string());
    for pattern in &coverage.counter_patterns {
        let full_pattern = format!("{}/{}", root, pattern);
        let paths = match glob::glob(&full_pattern) {
            Ok(paths) => paths,
            Err(e) => {
                debug!("Skipping pattern {}: {}", full_pattern, e);
                continue;
            }
        };
        for path in paths.flatten() {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }

    info!("Removed {} coverage file(s)", removed);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline::ProcessResult;
    use std::sync::Mutex;

    const LCOV_SUMMARY: &str = "Reading tracefile coverage_filtered.info\n\
        Summary coverage rate:\n  \
        lines......: 85.0% (170 of 200 lines)\n  \
        functions..: 91.0% (91 of 100 functions)\n  \
        branches...: 62.5% (50 of 80 branches)\n";

    #[test]
    fn test_parse_full_summary() {
        let summary = parse_summary(LCOV_SUMMARY);
        assert_eq!(summary.line_pct, 85.0);
        assert_eq!(summary.function_pct, 91.0);
        assert_eq!(summary.branch_pct, 62.5);
        assert_eq!(summary.raw_text, LCOV_SUMMARY);
    }

    #[test]
    fn test_parse_missing_fields_default_to_zero() {
        let summary = parse_summary("  lines......: 92.3% (12 of 13 lines)\n");
        assert_eq!(summary.line_pct, 92.3);
        assert_eq!(summary.function_pct, 0.0);
        assert_eq!(summary.branch_pct, 0.0);
        assert!(!ThresholdPolicy::STANDARD.evaluate(&summary).passed());
    }

    #[test]
    fn test_parse_no_data_branches() {
        let summary = parse_summary(
            "  lines......: 100.0% (4 of 4 lines)\n  \
             functions..: 100.0% (2 of 2 functions)\n  \
             branches...: no data found\n",
        );
        assert_eq!(summary.line_pct, 100.0);
        assert_eq!(summary.function_pct, 100.0);
        assert_eq!(summary.branch_pct, 0.0);
    }

    #[test]
    fn test_parse_integer_percentages_and_empty_text() {
        let summary = parse_summary("lines: 80% functions: 90%");
        assert_eq!(summary.line_pct, 80.0);
        assert_eq!(summary.function_pct, 90.0);

        assert_eq!(parse_summary(""), CoverageSummary::default());
    }

    type Respond = Box<dyn Fn(&Invocation) -> ProcessResult<CommandOutput> + Send + Sync>;

    struct ScriptedRunner {
        calls: Mutex<Vec<Invocation>>,
        respond: Respond,
    }

    impl ScriptedRunner {
        /// lcov/pio succeed; `--summary` prints `summary`; genhtml exits `genhtml_exit`
        fn lcov(summary: impl Into<String>, genhtml_exit: i32) -> Self {
            let summary = summary.into();
            Self::new(move |invocation| {
                if invocation.program == "genhtml" {
                    return Ok(CommandOutput::with_exit_code(genhtml_exit));
                }
                if invocation.args.first().map(String::as_str) == Some("--summary") {
                    return Ok(CommandOutput::with_exit_code(0).with_stderr(summary.clone()));
                }
                Ok(CommandOutput::with_exit_code(0))
            })
        }

        fn new(
            respond: impl Fn(&Invocation) -> ProcessResult<CommandOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        fn programs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|i| format!("{} {}", i.program, i.args.first().cloned().unwrap_or_default()))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> ProcessResult<CommandOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            (self.respond)(invocation)
        }
    }

    fn config() -> (tempfile::TempDir, PipelineConfig) {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default().with_root(root.path());
        (root, config)
    }

    fn summary_text(line: f64, function: f64) -> String {
        format!(
            "  lines......: {:.1}% (x of y lines)\n  functions..: {:.1}% (x of y functions)\n",
            line, function
        )
    }

    #[tokio::test]
    async fn test_gate_decisions_drive_exit_code() {
        for (line, function, expected) in [(79.9, 95.0, 1), (85.0, 91.0, 0), (85.0, 89.9, 1)] {
            let (_root, config) = config();
            let runner = ScriptedRunner::lcov(summary_text(line, function), 0);
            let run = CoveragePipeline::new(&config, &runner)
                .run(CoverageOptions::default())
                .await
                .unwrap();

            assert_eq!(run.summary.line_pct, line);
            assert_eq!(run.summary.function_pct, function);
            assert_eq!(run.exit_code(), expected, "line={} function={}", line, function);
            assert_eq!(run.report, ReportStatus::NotRequested);
        }
    }

    #[tokio::test]
    async fn test_full_sequence_order() {
        let (_root, config) = config();
        let runner = ScriptedRunner::lcov(LCOV_SUMMARY, 0);
        let options = CoverageOptions {
            run_tests: true,
            html_report: true,
        };

        let run = CoveragePipeline::new(&config, &runner)
            .run(options)
            .await
            .unwrap();

        assert_eq!(
            runner.programs(),
            vec![
                "pio test",
                "lcov --capture",
                "lcov --remove",
                "lcov --summary",
                "genhtml coverage_filtered.info",
            ]
        );
        assert!(matches!(run.report, ReportStatus::Generated { .. }));
        assert!(config.root.join("coverage_report").is_dir());
        assert_eq!(run.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_filter_excludes_system_dependency_and_test_sources() {
        let (_root, config) = config();
        let runner = ScriptedRunner::lcov(LCOV_SUMMARY, 0);
        let pipeline = CoveragePipeline::new(&config, &runner);

        let filter = pipeline.filter_invocation();
        assert_eq!(
            filter.args,
            vec![
                "--remove",
                "coverage.info",
                "/usr/*",
                "*/.pio/*",
                "*/test/*",
                "*/lib/*",
                "--output-file",
                "coverage_filtered.info",
            ]
        );
    }

    #[tokio::test]
    async fn test_skip_tests_starts_at_capture() {
        let (_root, config) = config();
        let runner = ScriptedRunner::lcov(LCOV_SUMMARY, 0);
        let options = CoverageOptions {
            run_tests: false,
            html_report: false,
        };

        CoveragePipeline::new(&config, &runner)
            .run(options)
            .await
            .unwrap();

        assert_eq!(runner.programs()[0], "lcov --capture");
        assert_eq!(runner.programs().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_tests_abort_everything() {
        let (_root, config) = config();
        let runner = ScriptedRunner::new(|invocation| {
            if invocation.program == "pio" {
                Ok(CommandOutput::with_exit_code(1))
            } else {
                Ok(CommandOutput::with_exit_code(0))
            }
        });

        let result = CoveragePipeline::new(&config, &runner)
            .run(CoverageOptions::default())
            .await;

        assert!(matches!(
            result,
            Err(CoverageError::TestsFailed { exit_code: Some(1) })
        ));
        assert_eq!(runner.programs(), vec!["pio test"]);
    }

    #[tokio::test]
    async fn test_capture_failure_aborts() {
        let (_root, config) = config();
        let runner = ScriptedRunner::new(|invocation| {
            if invocation.args.first().map(String::as_str) == Some("--capture") {
                Ok(CommandOutput::with_exit_code(2))
            } else {
                Ok(CommandOutput::with_exit_code(0))
            }
        });

        let result = CoveragePipeline::new(&config, &runner)
            .run(CoverageOptions::default())
            .await;

        assert!(matches!(
            result,
            Err(CoverageError::StepFailed {
                step: "capture",
                ..
            })
        ));
        assert_eq!(runner.programs().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_lcov_aborts_filter_step() {
        let (_root, config) = config();
        let runner = ScriptedRunner::new(|invocation| {
            if invocation.args.first().map(String::as_str) == Some("--remove") {
                Err(ProcessError::Launch {
                    command: invocation.command_line(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "lcov"),
                })
            } else {
                Ok(CommandOutput::with_exit_code(0))
            }
        });

        let result = CoveragePipeline::new(&config, &runner)
            .run(CoverageOptions::default())
            .await;

        assert!(matches!(
            result,
            Err(CoverageError::Tool { step: "filter", .. })
        ));
        assert_eq!(runner.programs().len(), 3);
    }

    #[tokio::test]
    async fn test_report_failure_does_not_change_verdict() {
        let (_root, config) = config();
        let runner = ScriptedRunner::lcov(LCOV_SUMMARY, 1);
        let options = CoverageOptions {
            run_tests: false,
            html_report: true,
        };

        let run = CoveragePipeline::new(&config, &runner)
            .run(options)
            .await
            .unwrap();

        assert!(matches!(run.report, ReportStatus::Failed { .. }));
        assert!(run.verdict.passed());
        assert_eq!(run.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_summary_fails_gate() {
        let (_root, config) = config();
        let runner = ScriptedRunner::new(|invocation| {
            if invocation.args.first().map(String::as_str) == Some("--summary") {
                Err(ProcessError::Timeout {
                    command: invocation.command_line(),
                    timeout: std::time::Duration::from_secs(600),
                })
            } else {
                Ok(CommandOutput::with_exit_code(0))
            }
        });

        let run = CoveragePipeline::new(&config, &runner)
            .run(CoverageOptions::default())
            .await
            .unwrap();

        assert_eq!(run.summary.line_pct, 0.0);
        assert_eq!(run.exit_code(), 1);
    }

    fn summary_on_both_streams(stderr: &'static str) -> ScriptedRunner {
        ScriptedRunner::new(move |invocation| {
            if invocation.args.first().map(String::as_str) == Some("--summary") {
                Ok(CommandOutput::with_exit_code(0)
                    .with_stdout(summary_text(85.0, 95.0))
                    .with_stderr(stderr))
            } else {
                Ok(CommandOutput::with_exit_code(0))
            }
        })
    }

    #[tokio::test]
    async fn test_summary_prefers_stderr_when_present() {
        let (_root, config) = config();
        let runner = summary_on_both_streams("lcov: WARNING: (inconsistent) mismatched end line\n");

        let run = CoveragePipeline::new(&config, &runner)
            .run(CoverageOptions::default())
            .await
            .unwrap();

        assert_eq!(run.summary.line_pct, 0.0);
        assert_eq!(run.summary.function_pct, 0.0);
        assert!(run.summary.raw_text.contains("WARNING"));
        assert_eq!(run.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_summary_falls_back_to_stdout() {
        let (_root, config) = config();
        let runner = summary_on_both_streams("");

        let run = CoveragePipeline::new(&config, &runner)
            .run(CoverageOptions::default())
            .await
            .unwrap();

        assert_eq!(run.summary.line_pct, 85.0);
        assert_eq!(run.summary.function_pct, 95.0);
        assert_eq!(run.exit_code(), 0);
    }

    #[test]
    fn test_clean_removes_reports_and_counters() {
        let (root, config) = config();
        for file in [
            "coverage.info",
            "coverage_filtered.info",
            "MathUtil.gcda",
            "MathUtil.gcno",
            "Rect.cpp.gcov",
            "keep.cpp",
        ] {
            std::fs::write(root.path().join(file), "").unwrap();
        }

        let removed = clean(&config);

        assert_eq!(removed, 5);
        assert!(root.path().join("keep.cpp").exists());
        assert!(!root.path().join("coverage.info").exists());
        assert!(!root.path().join("MathUtil.gcda").exists());
    }

    #[test]
    fn test_clean_tolerates_missing_files() {
        let (root, config) = config();
        std::fs::write(root.path().join("coverage_filtered.info"), "").unwrap();

        assert_eq!(clean(&config), 1);
        assert_eq!(clean(&config), 0);
        assert!(!root.path().join("coverage_filtered.info").exists());
    }
}
