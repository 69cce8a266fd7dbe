use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings shared by the test and coverage pipelines.
///
/// Relative paths are resolved against `root`, which always comes from the
/// command line rather than the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(skip)]
    pub root: PathBuf,
    pub compiler: String,
    pub compiler_flags: Vec<String>,
    pub build_dir: PathBuf,
    pub compile_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub toolchain: ToolchainConfig,
    pub coverage: CoverageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            compiler: "g++".to_string(),
            compiler_flags: [
                "-std=c++17",
                "-Wall",
                "-Wextra",
                "-g",
                "-O0",
                "-Iinclude",
                "-DPLATFORM_NATIVE",
                "-DUNIT_TEST",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            build_dir: PathBuf::from("build/tests"),
            compile_timeout_secs: 300,
            test_timeout_secs: 60,
            toolchain: ToolchainConfig::default(),
            coverage: CoverageConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_toolchain(mut self, toolchain: ToolchainConfig) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_coverage(mut self, coverage: CoverageConfig) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Resolve a path from the config against the working-tree root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.compiler.trim().is_empty() {
            return Err(invalid("Compiler cannot be empty"));
        }

        if self.compile_timeout_secs == 0 || self.test_timeout_secs == 0 {
            return Err(invalid("Timeouts must be greater than 0"));
        }

        if self.build_dir.as_os_str().is_empty() {
            return Err(invalid("Build directory cannot be empty"));
        }

        self.toolchain.validate()?;
        self.coverage.validate()
    }
}

/// Where the Unity sources are expected and how to fetch them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub primary_dir: PathBuf,
    pub alternate_dir: Option<PathBuf>,
    pub package_manager: String,
    pub package_install_args: Vec<String>,
    pub git: String,
    pub repository_url: String,
    pub tool_timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            primary_dir: PathBuf::from(".pio/libdeps/native_test/Unity/src"),
            alternate_dir: std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".platformio/lib/Unity/src")),
            package_manager: "pio".to_string(),
            package_install_args: [
                "pkg",
                "install",
                "-e",
                "native_test",
                "-l",
                "throwtheswitch/Unity",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            git: "git".to_string(),
            repository_url: "https://github.com/ThrowTheSwitch/Unity.git".to_string(),
            tool_timeout_secs: 600,
        }
    }
}

impl ToolchainConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn with_primary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.primary_dir = dir.into();
        self
    }

    pub fn with_alternate_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.alternate_dir = dir;
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.primary_dir.as_os_str().is_empty() {
            return Err(invalid("Toolchain directory cannot be empty"));
        }
        if self.tool_timeout_secs == 0 {
            return Err(invalid("Toolchain tool timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Coverage tool commands and the intermediate files they produce
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub test_command: Vec<String>,
    pub lcov: String,
    pub genhtml: String,
    pub raw_report: PathBuf,
    pub filtered_report: PathBuf,
    pub report_dir: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub counter_patterns: Vec<String>,
    pub tool_timeout_secs: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            test_command: ["pio", "test", "-e", "native_test"]
                .into_iter()
                .map(String::from)
                .collect(),
            lcov: "lcov".to_string(),
            genhtml: "genhtml".to_string(),
            raw_report: PathBuf::from("coverage.info"),
            filtered_report: PathBuf::from("coverage_filtered.info"),
            report_dir: PathBuf::from("coverage_report"),
            exclude_patterns: ["/usr/*", "*/.pio/*", "*/test/*", "*/lib/*"]
                .into_iter()
                .map(String::from)
                .collect(),
            counter_patterns: ["*.gcov", "*.gcda", "*.gcno"]
                .into_iter()
                .map(String::from)
                .collect(),
            tool_timeout_secs: 600,
        }
    }
}

impl CoverageConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.test_command.is_empty() {
            return Err(invalid("Coverage test command cannot be empty"));
        }
        if self.tool_timeout_secs == 0 {
            return Err(invalid("Coverage tool timeout must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}
