//! Configuration file support for zapp.
//!
//! zapp reads two configuration file locations:
//! - Global: `<config dir>/zapp/config.toml` - User-wide defaults
//! - Project: `.zapp/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Command-line flags
//! and environment variables take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Interpreter used for user entry points when nothing else is configured.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Environment variable the interpreter reads its module search path from.
pub const DEFAULT_PATH_VAR: &str = "PYTHONPATH";

/// zapp configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compiler settings
    pub build: BuildConfig,

    /// Runtime loader settings
    pub runtime: RuntimeConfig,
}

/// Settings for `zapp compile`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Repack unpacked wheel trees into cached wheels
    pub use_wheels: bool,

    /// Let the entry script call `module:function` references
    pub call_entry_functions: bool,

    /// Cache root override
    pub cache_dir: Option<PathBuf>,
}

/// Settings for `zapp-run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interpreter command, e.g. `["python3", "-I"]`
    pub interpreter: Option<Vec<String>>,

    /// Search-path environment variable for the interpreter
    pub path_var: Option<String>,

    /// Call the function of `module:function` references instead of
    /// running the module as a main program
    pub call_entry_functions: bool,
}

impl RuntimeConfig {
    pub fn interpreter(&self) -> Vec<String> {
        self.interpreter
            .clone()
            .filter(|argv| !argv.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_INTERPRETER.to_string()])
    }

    pub fn path_var(&self) -> &str {
        self.path_var.as_deref().unwrap_or(DEFAULT_PATH_VAR)
    }

    /// Apply `ZAPP_INTERPRETER` and `ZAPP_CALL_ENTRY_FUNCTIONS`.
    pub fn apply_env(&mut self) {
        if let Ok(interpreter) = std::env::var("ZAPP_INTERPRETER") {
            let argv: Vec<String> = interpreter.split_whitespace().map(String::from).collect();
            if !argv.is_empty() {
                self.interpreter = Some(argv);
            }
        }
        if let Ok(flag) = std::env::var("ZAPP_CALL_ENTRY_FUNCTIONS") {
            self.call_entry_functions = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Build settings
        if other.build.use_wheels {
            self.build.use_wheels = true;
        }
        if other.build.call_entry_functions {
            self.build.call_entry_functions = true;
        }
        if other.build.cache_dir.is_some() {
            self.build.cache_dir = other.build.cache_dir;
        }

        // Runtime settings
        if other.runtime.interpreter.is_some() {
            self.runtime.interpreter = other.runtime.interpreter;
        }
        if other.runtime.path_var.is_some() {
            self.runtime.path_var = other.runtime.path_var;
        }
        if other.runtime.call_entry_functions {
            self.runtime.call_entry_functions = true;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.zapp/config.toml)
/// 2. Global config (<config dir>/zapp/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    // Project config overrides global
    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}
