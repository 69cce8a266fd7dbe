//! Unity toolchain resolution for native test builds
//!
//! Test binaries link against the Unity assertion framework, which is not
//! vendored. This crate makes sure `unity.h`, `unity.c` and
//! `unity_internals.h` are on disk before anything is compiled, fetching
//! them through a chain of strategies if needed.

pub mod resolver;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use resolver::{
    PackageManagerInstall, ProbeDirectory, ResolveContext, ResolveStrategy, Resolver,
    ShallowClone,
};

/// Public header of the framework
pub const HEADER: &str = "unity.h";
/// Assertion primitives compiled into every test binary
pub const PRIMITIVES_SOURCE: &str = "unity.c";
/// Header included by `unity.h` itself
pub const INTERNAL_HEADER: &str = "unity_internals.h";

/// Errors related to toolchain resolution
#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("Unity sources not found in {dir}")]
    NotFound { dir: String },

    #[error("Command failed: {command} (exit {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Process error: {0}")]
    Process(#[from] pipeline::ProcessError),

    #[error("Failed to copy {file} into {dir}: {source}")]
    CopyFailed {
        file: String,
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unity could not be resolved; tried: {}", attempts.join("; "))]
    Exhausted { attempts: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ToolchainResult<T> = Result<T, ToolchainError>;

/// A directory holding a usable copy of the Unity sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    dir: PathBuf,
}

impl Toolchain {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory passed to the compiler as an include path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn header(&self) -> PathBuf {
        self.dir.join(HEADER)
    }

    pub fn primitives_source(&self) -> PathBuf {
        self.dir.join(PRIMITIVES_SOURCE)
    }

    pub fn internal_header(&self) -> PathBuf {
        self.dir.join(INTERNAL_HEADER)
    }

    /// Whether `dir` holds the header and the primitives source
    pub fn is_satisfied(dir: &Path) -> bool {
        dir.join(HEADER).is_file() && dir.join(PRIMITIVES_SOURCE).is_file()
    }
}
