pub mod config;
pub mod manifest;
pub mod process;
pub mod types;

pub use config::{ConfigError, ConfigResult, CoverageConfig, PipelineConfig, ToolchainConfig};
pub use manifest::{Manifest, TestTarget};
pub use process::{
    CommandOutput, CommandRunner, Invocation, ProcessError, ProcessResult, SystemRunner,
};
pub use types::{
    CoverageSummary, ExecutionResult, FailureKind, GateVerdict, Stage, ThresholdPolicy,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::manifest::*;
    pub use crate::process::*;
    pub use crate::types::*;
}
