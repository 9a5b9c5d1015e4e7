//! Global context for zapp operations.
//!
//! Provides centralized access to configuration and well-known paths.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::util::config::{load_config, Config};

/// Overrides the persistent cache root.
pub const CACHE_DIR_ENV: &str = "ZAPP_CACHE_DIR";

/// Scratch directory shared with re-exec'd children.
pub const TMPDIR_ENV: &str = "ZAPP_TMPDIR";

/// Project directories for zapp
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("", "", "zapp"));

/// The persistent, per-user cache root.
///
/// `ZAPP_CACHE_DIR` wins; otherwise the platform cache directory
/// (`~/.cache/zapp` on Linux), falling back to `~/.cache/zapp` when the
/// platform gives no answer.
pub fn default_cache_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    if let Some(dirs) = PROJECT_DIRS.as_ref() {
        return Some(dirs.cache_dir().to_path_buf());
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cache").join("zapp"))
}

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Persistent cache root, if the platform has one
    cache_dir: Option<PathBuf>,

    /// Merged configuration
    config: Config,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext, loading global and project config.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let mut ctx = GlobalContext {
            cwd,
            cache_dir: default_cache_dir(),
            config: Config::default(),
            verbose: false,
        };
        let global = ctx.config_path().unwrap_or_default();
        ctx.config = load_config(&global, &ctx.project_config_path());
        ctx.config.runtime.apply_env();
        ctx
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The cache root: config override, then the per-user default.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if std::env::var_os(CACHE_DIR_ENV).is_some_and(|v| !v.is_empty()) {
            return self.cache_dir.clone();
        }
        self.config
            .build
            .cache_dir
            .clone()
            .or_else(|| self.cache_dir.clone())
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> Option<PathBuf> {
        PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the project-local configuration file path.
    pub fn project_config_path(&self) -> PathBuf {
        self.cwd.join(".zapp").join("config.toml")
    }
}
