//! Named generation configurations.
//!
//! Each configuration is a JSON file `{config_dir}/{name}.json` describing the
//! model, sampler settings, prompt template and output options for one kind of
//! batch. Jobs reference a configuration by name and the batch runner reloads
//! it when the job starts, so edits apply to jobs that have not started yet.

use garde::Validate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model selection forwarded to the remote API as override settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModelSettings {
    #[garde(skip)]
    #[serde(default)]
    pub checkpoint: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub vae: Option<String>,

    #[garde(range(min = 1, max = 12))]
    #[serde(default = "default_clip_skip")]
    pub clip_skip: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            checkpoint: None,
            vae: None,
            clip_skip: default_clip_skip(),
        }
    }
}

/// Sampler parameters for txt2img.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationParams {
    #[garde(range(min = 1, max = 150))]
    #[serde(default = "default_steps")]
    pub steps: u32,

    #[garde(range(min = 1.0, max = 30.0))]
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,

    #[garde(range(min = 64, max = 4096), custom(multiple_of_eight))]
    #[serde(default = "default_dimension")]
    pub width: u32,

    #[garde(range(min = 64, max = 4096), custom(multiple_of_eight))]
    #[serde(default = "default_dimension")]
    pub height: u32,

    #[garde(length(min = 1, max = 100))]
    #[serde(default = "default_sampler")]
    pub sampler: String,

    #[garde(skip)]
    #[serde(default)]
    pub scheduler: Option<String>,

    /// Fixed seed, or -1 for a random seed per image.
    #[garde(range(min = -1, max = 4_294_967_295))]
    #[serde(default = "default_seed")]
    pub seed: i64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            cfg_scale: default_cfg_scale(),
            width: default_dimension(),
            height: default_dimension(),
            sampler: default_sampler(),
            scheduler: None,
            seed: default_seed(),
        }
    }
}

/// Prompt template. `positive` may contain `__wildcard__` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PromptTemplate {
    #[garde(length(min = 1, max = 10_000))]
    pub positive: String,

    #[garde(length(max = 10_000))]
    #[serde(default)]
    pub negative: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct OutputSettings {
    /// Subdirectory under the output root; defaults to the config name.
    #[garde(skip)]
    #[serde(default)]
    pub directory: Option<String>,
}

/// A named generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationConfig {
    /// Filled in from the file name by [`ConfigStore::load`].
    #[garde(skip)]
    #[serde(default)]
    pub name: String,

    #[garde(dive)]
    #[serde(default)]
    pub model: ModelSettings,

    #[garde(dive)]
    #[serde(default)]
    pub generation: GenerationParams,

    #[garde(dive)]
    pub prompt: PromptTemplate,

    #[garde(dive)]
    #[serde(default)]
    pub output: OutputSettings,
}

impl GenerationConfig {
    /// Directory name used for this config's images.
    pub fn output_subdir(&self) -> &str {
        self.output.directory.as_deref().unwrap_or(&self.name)
    }
}

fn default_clip_skip() -> u32 {
    1
}

fn default_steps() -> u32 {
    30
}

fn default_cfg_scale() -> f64 {
    7.0
}

fn default_dimension() -> u32 {
    512
}

fn default_sampler() -> String {
    "Euler a".to_string()
}

fn default_seed() -> i64 {
    -1
}

fn multiple_of_eight(value: &u32, _ctx: &()) -> garde::Result {
    if value % 8 != 0 {
        return Err(garde::Error::new("must be a multiple of 8"));
    }
    Ok(())
}

/// Loads generation configurations from a directory.
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and validate the configuration called `name`.
    pub fn load(&self, name: &str) -> Result<GenerationConfig, ConfigError> {
        if !is_valid_name(name) {
            return Err(ConfigError::InvalidName(name.to_string()));
        }

        let path = self.dir.join(format!("{name}.json"));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(name.to_string()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let mut config: GenerationConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
                name: name.to_string(),
                source,
            })?;
        config.name = name.to_string();

        config.validate().map_err(|report| ConfigError::Invalid {
            name: name.to_string(),
            report: report.to_string(),
        })?;

        Ok(config)
    }

    /// Names of all configurations in the directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_name(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration '{0}' not found")]
    NotFound(String),

    #[error("Invalid configuration name '{0}'")]
    InvalidName(String),

    #[error("Configuration '{name}' is not valid JSON: {source}")]
    Malformed {
        name: String,
        source: serde_json::Error,
    },

    #[error("Configuration '{name}' failed validation: {report}")]
    Invalid { name: String, report: String },

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{name}.json")), body).unwrap();
    }

    #[test]
    fn test_load_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "portrait", r#"{"prompt": {"positive": "a __animal__"}}"#);

        let config = ConfigStore::new(dir.path()).load("portrait").unwrap();
        assert_eq!(config.name, "portrait");
        assert_eq!(config.generation.steps, 30);
        assert_eq!(config.generation.seed, -1);
        assert_eq!(config.output_subdir(), "portrait");
    }

    #[test]
    fn test_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigStore::new(dir.path()).load("nope").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigStore::new(dir.path()).load("../secrets").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName(_)));
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken", "{ not json");
        let err = ConfigStore::new(dir.path()).load("broken").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_validation_rejects_odd_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "odd",
            r#"{"prompt": {"positive": "cat"}, "generation": {"width": 513}}"#,
        );
        let err = ConfigStore::new(dir.path()).load("odd").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validation_rejects_empty_template() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "empty", r#"{"prompt": {"positive": ""}}"#);
        let err = ConfigStore::new(dir.path()).load("empty").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_list_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b", r#"{"prompt": {"positive": "x"}}"#);
        write(dir.path(), "a", r#"{"prompt": {"positive": "x"}}"#);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let names = ConfigStore::new(dir.path()).list().unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
