//! The build-and-run pipeline: compiler probe, toolchain resolution, then
//! the build matrix.
//!
//! Only the two preconditions can fail here. Everything that goes wrong for
//! an individual target is recorded in the returned [`Summary`].

use crate::console;
use crate::matrix::BuildMatrix;
use crate::summary::Summary;
use pipeline::{CommandRunner, Invocation, Manifest, PipelineConfig};
use thiserror::Error;
use toolchain::{ResolveContext, Resolver, ToolchainError};
use tracing::info;

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("Compiler '{compiler}' is not usable: {reason}")]
    CompilerUnavailable { compiler: String, reason: String },

    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SuiteResult<T> = Result<T, SuiteError>;

/// Check that the compiler starts, and print its version line
pub async fn probe_compiler(
    config: &PipelineConfig,
    runner: &dyn CommandRunner,
) -> SuiteResult<String> {
    let invocation = Invocation::new(&config.compiler)
        .arg("--version")
        .current_dir(&config.root)
        .with_timeout(config.compile_timeout());

    let unavailable = |reason: String| SuiteError::CompilerUnavailable {
        compiler: config.compiler.clone(),
        reason,
    };

    let output = runner
        .run(&invocation)
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    if !output.success() {
        return Err(unavailable(format!("exit {:?}", output.exit_code)));
    }

    let version = output.stdout.lines().next().unwrap_or_default().to_string();
    println!("\nCompiler: {}", version);
    Ok(version)
}

pub async fn run_suite(
    config: &PipelineConfig,
    manifest: &Manifest,
    filter: Option<&str>,
    runner: &dyn CommandRunner,
    resolver: &Resolver,
) -> SuiteResult<Summary> {
    probe_compiler(config, runner).await?;

    let ctx = ResolveContext::from_config(config, runner);
    let toolchain = match resolver.resolve(&ctx).await {
        Ok(toolchain) => toolchain,
        Err(e) => {
            console::echo_error(&e);
            return Err(e.into());
        }
    };
    info!("Using Unity from {}", toolchain.dir().display());

    let matrix = BuildMatrix::new(config, manifest, &toolchain, runner);
    Ok(matrix.run(filter).await?)
}
