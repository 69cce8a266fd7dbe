//! Build matrix executor.
//!
//! Each selected target gets one compiler invocation of the form
//!
//! ```text
//! <compiler> <flags...> -I<unity dir> <test source> <unity.c> <companions...> -o <build dir>/<artifact>
//! ```
//!
//! run from the working-tree root, followed by a run of the artifact if it
//! built. Targets are processed strictly in manifest order, one at a time,
//! and every failure stays local to its target.

use crate::console;
use crate::execute::run_artifact;
use crate::summary::Summary;
use pipeline::{
    CommandRunner, ExecutionResult, FailureKind, Invocation, Manifest, PipelineConfig,
    ProcessError, Stage, TestTarget,
};
use std::path::PathBuf;
use toolchain::Toolchain;
use tracing::{debug, info, warn};

enum CompileOutcome {
    Built,
    Failed(ExecutionResult),
}

pub struct BuildMatrix<'a> {
    config: &'a PipelineConfig,
    manifest: &'a Manifest,
    toolchain: &'a Toolchain,
    runner: &'a dyn CommandRunner,
}

impl<'a> BuildMatrix<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        manifest: &'a Manifest,
        toolchain: &'a Toolchain,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            config,
            manifest,
            toolchain,
            runner,
        }
    }

    pub fn build_dir(&self) -> PathBuf {
        self.config.resolve(&self.config.build_dir)
    }

    pub fn artifact_path(&self, target: &TestTarget) -> PathBuf {
        self.build_dir().join(&target.artifact_name)
    }

    pub fn compile_invocation(&self, target: &TestTarget) -> Invocation {
        let mut invocation = Invocation::new(&self.config.compiler)
            .args(self.config.compiler_flags.iter().cloned())
            .arg(format!("-I{}", self.toolchain.dir().display()))
            .path_arg(&target.test_source)
            .path_arg(&self.toolchain.primitives_source());

        for companion in &target.companion_sources {
            invocation = invocation.path_arg(companion);
        }

        invocation
            .arg("-o")
            .path_arg(&self.artifact_path(target))
            .current_dir(&self.config.root)
            .with_timeout(self.config.compile_timeout())
    }

    /// Compile and run every selected target, in manifest order
    pub async fn run(&self, filter: Option<&str>) -> std::io::Result<Summary> {
        std::fs::create_dir_all(self.build_dir())?;

        let mut summary = Summary::new();
        for target in self.manifest.select(filter) {
            let result = self.run_target(target).await;
            summary.record(result);
            println!();
        }

        info!(
            "Build matrix finished: {}/{} passed",
            summary.passed_count(),
            summary.total_count()
        );
        Ok(summary)
    }

    pub async fn run_target(&self, target: &TestTarget) -> ExecutionResult {
        match self.compile(target).await {
            CompileOutcome::Built => {
                run_artifact(
                    self.runner,
                    &target.name,
                    &self.artifact_path(target),
                    self.config.test_timeout(),
                )
                .await
            }
            CompileOutcome::Failed(result) => result,
        }
    }

    async fn compile(&self, target: &TestTarget) -> CompileOutcome {
        let source = self.config.resolve(&target.test_source);
        if !source.exists() {
            warn!("{}: test source {} does not exist", target.name, source.display());
            console::echo_error(&format!("Missing: {}", target.test_source.display()));
            return CompileOutcome::Failed(ExecutionResult::not_compiled(
                &target.name,
                FailureKind::MissingSource {
                    path: target.test_source.display().to_string(),
                },
            ));
        }

        let invocation = self.compile_invocation(target);
        console::announce(&format!("Compiling {}", target.name), &invocation);
        debug!("{}: {}", target.name, invocation.command_line());

        match self.runner.run(&invocation).await {
            Ok(output) => {
                console::echo_output(&output);
                if output.success() {
                    CompileOutcome::Built
                } else {
                    warn!("{}: compilation failed", target.name);
                    CompileOutcome::Failed(
                        ExecutionResult::not_compiled(
                            &target.name,
                            FailureKind::CompileFailed {
                                exit_code: output.exit_code,
                            },
                        )
                        .with_exit_code(output.exit_code)
                        .with_output(output.stdout, output.stderr),
                    )
                }
            }
            Err(ProcessError::Timeout { timeout, .. }) => {
                warn!("{}: compiler timed out after {:?}", target.name, timeout);
                console::echo_error(&format!("Compiler timed out after {}s", timeout.as_secs()));
                CompileOutcome::Failed(ExecutionResult::not_compiled(
                    &target.name,
                    FailureKind::TimedOut {
                        stage: Stage::Compile,
                        timeout_secs: timeout.as_secs(),
                    },
                ))
            }
            Err(e) => {
                warn!("{}: could not launch compiler: {}", target.name, e);
                console::echo_error(&e);
                CompileOutcome::Failed(
                    ExecutionResult::not_compiled(
                        &target.name,
                        FailureKind::LaunchFailed {
                            message: e.to_string(),
                        },
                    )
                    .with_output(String::new(), e.to_string()),
                )
            }
        }
    }
}
