//! The ordered declaration of test targets.
//!
//! A [`Manifest`] is built once at startup, either from the built-in table
//! of engine unit suites or from an explicitly named TOML file, and is then
//! only ever borrowed.

use crate::config::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One named unit of compile-and-run work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestTarget {
    /// Display label, also matched by the name filter
    pub name: String,
    /// Test translation unit, relative to the working-tree root
    pub test_source: PathBuf,
    /// Implementation files linked into the test, in order
    #[serde(default)]
    pub companion_sources: Vec<PathBuf>,
    /// File name of the executable inside the build directory
    pub artifact_name: String,
}

impl TestTarget {
    pub fn new(
        name: impl Into<String>,
        test_source: impl Into<PathBuf>,
        artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            test_source: test_source.into(),
            companion_sources: Vec::new(),
            artifact_name: artifact_name.into(),
        }
    }

    pub fn with_companions<I, P>(mut self, companions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.companion_sources = companions.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive substring match against the display name
    pub fn matches(&self, filter: &str) -> bool {
        self.name.to_lowercase().contains(&filter.to_lowercase())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(rename = "target", default)]
    targets: Vec<TestTarget>,
}

impl Manifest {
    pub fn new(targets: Vec<TestTarget>) -> Self {
        Self { targets }
    }

    /// The engine's unit suites, in the order they are run
    pub fn builtin() -> Self {
        let unit = |name: &str, dir: &str, artifact: &str| {
            TestTarget::new(
                name,
                format!("test/unit/{dir}/{artifact}.cpp"),
                artifact,
            )
        };

        Self::new(vec![
            unit("Math", "test_math", "test_mathutil"),
            unit("Core-Rect", "test_rect", "test_rect"),
            unit("Core-Entity", "test_entity", "test_entity"),
            unit("Core-Actor", "test_actor", "test_actor"),
            unit("Core-Scene", "test_scene", "test_scene"),
            unit("Core-SceneManager", "test_scene_manager", "test_scene_manager"),
            unit("Physics-Types", "test_collision_types", "test_collision_types"),
            unit(
                "Physics-Primitives",
                "test_collision_primitives",
                "test_collision_primitives",
            ),
            unit("Physics-System", "test_collision_system", "test_collision_system"),
            unit("Graphics-Color", "test_color", "test_color"),
            unit("Graphics-Camera2D", "test_camera2d", "test_camera2d"),
            unit("Graphics-FontManager", "test_font_manager", "test_font_manager"),
            unit("Input-Config", "test_input_config", "test_input_config"),
            unit("Input-Manager", "test_input_manager", "test_input_manager").with_companions([
                "src/input/InputManager.cpp",
                "src/platforms/mock/MockArduino.cpp",
            ]),
            unit(
                "Audio-Queue",
                "test_audio_command_queue",
                "test_audio_command_queue",
            ),
            unit("Audio-Scheduler", "test_audio_scheduler", "test_audio_scheduler")
                .with_companions(["src/audio/DefaultAudioScheduler.cpp"]),
            unit("Audio-Music", "test_music_player", "test_music_player").with_companions([
                "src/audio/MusicPlayer.cpp",
                "src/audio/AudioEngine.cpp",
                "src/audio/DefaultAudioScheduler.cpp",
            ]),
        ])
    }

    /// Parse a manifest made of `[[target]]` tables
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "Target name cannot be empty".to_string(),
                });
            }
            if target.artifact_name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("Target '{}' has an empty artifact name", target.name),
                });
            }
        }
        Ok(())
    }

    pub fn targets(&self) -> &[TestTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets selected by an optional filter, in declaration order
    pub fn select<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a TestTarget> {
        self.targets
            .iter()
            .filter(move |target| filter.is_none_or(|f| target.matches(f)))
    }
}
