//! Ordered resolution chain for the Unity sources.
//!
//! The chain is a list of [`ResolveStrategy`] objects tried in order. The
//! first strategy that produces a [`Toolchain`] wins; a strategy that fails
//! is recorded and the next one is tried. When every strategy has failed the
//! resolver returns [`ToolchainError::Exhausted`].
//!
//! The standard chain is:
//! 1. probe the primary directory (no side effects)
//! 2. probe the alternate directory, if one is configured
//! 3. install through the package manager, then re-probe the primary directory
//! 4. shallow-clone upstream into a temporary directory and copy the files over

use crate::{
    Toolchain, ToolchainError, ToolchainResult, HEADER, INTERNAL_HEADER, PRIMITIVES_SOURCE,
};
use async_trait::async_trait;
use pipeline::{CommandRunner, Invocation, PipelineConfig, ToolchainConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything a strategy may touch while resolving
pub struct ResolveContext<'a> {
    /// Working-tree root, used as the working directory of external tools
    pub root: PathBuf,
    /// Directory the compiler expects the sources in
    pub primary_dir: PathBuf,
    pub runner: &'a dyn CommandRunner,
    pub timeout: Duration,
}

impl<'a> ResolveContext<'a> {
    pub fn from_config(config: &PipelineConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            root: config.root.clone(),
            primary_dir: config.resolve(&config.toolchain.primary_dir),
            runner,
            timeout: config.toolchain.tool_timeout(),
        }
    }
}

#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// Short description used in logs and in the exhaustion error
    fn name(&self) -> String;

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> ToolchainResult<Toolchain>;
}

/// Accepts a directory that already holds the sources
pub struct ProbeDirectory {
    label: String,
    dir: Option<PathBuf>,
}

impl ProbeDirectory {
    /// Probe the context's primary directory
    pub fn primary() -> Self {
        Self {
            label: "primary".to_string(),
            dir: None,
        }
    }

    /// Probe `dir`; a relative path is taken from the working-tree root
    pub fn at(label: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl ResolveStrategy for ProbeDirectory {
    fn name(&self) -> String {
        format!("probe {} directory", self.label)
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> ToolchainResult<Toolchain> {
        match &self.dir {
            // Relative directories are taken from the working-tree root.
            Some(dir) => probe(&ctx.root.join(dir)),
            None => probe(&ctx.primary_dir),
        }
    }
}

/// Installs Unity into the test environment with the package manager
pub struct PackageManagerInstall {
    program: String,
    args: Vec<String>,
}

impl PackageManagerInstall {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl ResolveStrategy for PackageManagerInstall {
    fn name(&self) -> String {
        format!("{} install", self.program)
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> ToolchainResult<Toolchain> {
        let invocation = Invocation::new(&self.program)
            .args(self.args.iter().cloned())
            .current_dir(&ctx.root)
            .with_timeout(ctx.timeout);

        info!("Installing Unity: {}", invocation.command_line());
        let output = ctx.runner.run(&invocation).await?;
        if !output.success() {
            return Err(ToolchainError::CommandFailed {
                command: invocation.command_line(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        probe(&ctx.primary_dir)
    }
}

/// Shallow-clones the upstream repository and copies the three files into
/// the primary directory
pub struct ShallowClone {
    git: String,
    repository_url: String,
}

impl ShallowClone {
    pub fn new(git: impl Into<String>, repository_url: impl Into<String>) -> Self {
        Self {
            git: git.into(),
            repository_url: repository_url.into(),
        }
    }
}

#[async_trait]
impl ResolveStrategy for ShallowClone {
    fn name(&self) -> String {
        format!("clone {}", self.repository_url)
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> ToolchainResult<Toolchain> {
        let scratch = tempfile::Builder::new().prefix("unity-clone").tempdir()?;
        let checkout = scratch.path().join("Unity");

        let invocation = Invocation::new(&self.git)
            .args(["clone", "--depth", "1", self.repository_url.as_str()])
            .path_arg(&checkout)
            .with_timeout(ctx.timeout);

        info!("Cloning Unity: {}", invocation.command_line());
        let output = ctx.runner.run(&invocation).await?;
        if !output.success() {
            return Err(ToolchainError::CommandFailed {
                command: invocation.command_line(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let source_dir = checkout.join("src");
        std::fs::create_dir_all(&ctx.primary_dir)?;

        // unity.h is copied last so an interrupted copy never probes as satisfied.
        for file in [INTERNAL_HEADER, PRIMITIVES_SOURCE, HEADER] {
            std::fs::copy(source_dir.join(file), ctx.primary_dir.join(file)).map_err(
                |source| ToolchainError::CopyFailed {
                    file: file.to_string(),
                    dir: ctx.primary_dir.display().to_string(),
                    source,
                },
            )?;
            debug!("Copied {} into {}", file, ctx.primary_dir.display());
        }

        scratch.close()?;
        Ok(Toolchain::new(ctx.primary_dir.clone()))
    }
}

fn probe(dir: &Path) -> ToolchainResult<Toolchain> {
    if Toolchain::is_satisfied(dir) {
        Ok(Toolchain::new(dir))
    } else {
        Err(ToolchainError::NotFound {
            dir: dir.display().to_string(),
        })
    }
}

/// Ordered chain of strategies
pub struct Resolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The probe, alternate, install, clone chain described by `config`
    pub fn standard(config: &ToolchainConfig) -> Self {
        let mut resolver = Self::new().with_strategy(Box::new(ProbeDirectory::primary()));
        if let Some(alternate) = &config.alternate_dir {
            resolver = resolver.with_strategy(Box::new(ProbeDirectory::at(
                "alternate",
                alternate.clone(),
            )));
        }
        resolver
            .with_strategy(Box::new(PackageManagerInstall::new(
                &config.package_manager,
                config.package_install_args.clone(),
            )))
            .with_strategy(Box::new(ShallowClone::new(
                &config.git,
                &config.repository_url,
            )))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ResolveStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, ctx: &ResolveContext<'_>) -> ToolchainResult<Toolchain> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            match strategy.attempt(ctx).await {
                Ok(toolchain) => {
                    info!(
                        "Unity resolved by '{}' at {}",
                        strategy.name(),
                        toolchain.dir().display()
                    );
                    return Ok(toolchain);
                }
                Err(e) => {
                    debug!("Strategy '{}' did not resolve Unity: {}", strategy.name(), e);
                    attempts.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        warn!("All {} Unity resolution strategies failed", attempts.len());
        Err(ToolchainError::Exhausted { attempts })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
