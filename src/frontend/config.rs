use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::exttypes::pipeline::CompileFlags;
use crate::exttypes::validators::ValidationConfig;
use crate::infrastructure::logging::LogFormat;

/// File name searched for by [`Config::discover`].
pub const CONFIG_FILE: &str = ".typthon-ext.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compile: CompileConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub errors: ErrorConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Compile independent classes of a module on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Forwarded verbatim to the type-inference engine
    #[serde(default)]
    pub flags: CompileFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    #[serde(default = "default_100")]
    pub max_errors: usize,

    #[serde(default = "default_true")]
    pub color: bool,

    #[serde(default)]
    pub format: ErrorFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    #[default]
    Default,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            flags: CompileFlags::new(),
        }
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            color: true,
            format: ErrorFormat::Default,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.py".to_string()],
            exclude: vec![
                "**/__pycache__/**".to_string(),
                "**/venv/**".to_string(),
                "**/.venv/**".to_string(),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Compact,
        }
    }
}

fn default_true() -> bool { true }
fn default_100() -> usize { 100 }
fn default_level() -> String { "warn".to_string() }

impl Config {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Nearest `.typthon-ext.toml` in `start` or its parents.
    pub fn find(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        None
    }

    /// Load the nearest configuration file, falling back to defaults.
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find(&dir))
            .and_then(|path| Self::load(&path).ok())
            .unwrap_or_default()
    }

    pub fn matches_glob(path: &Path, pattern: &str) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        match glob::Pattern::new(pattern) {
            Ok(pattern) => {
                let options = glob::MatchOptions {
                    require_literal_separator: false,
                    ..Default::default()
                };
                pattern.matches_with(&normalized, options)
            }
            Err(_) => normalized.contains(pattern),
        }
    }

    /// Whether a file passes the include/exclude patterns
    pub fn should_compile(&self, path: &Path) -> bool {
        if self.paths.exclude.iter().any(|pattern| Self::matches_glob(path, pattern)) {
            return false;
        }

        self.paths.include.is_empty()
            || self.paths.include.iter().any(|pattern| Self::matches_glob(path, pattern))
    }

    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}
