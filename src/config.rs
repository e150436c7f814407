//! Configuration file support
//!
//! Settings live in `config.toml` under the platform config directory
//! (`~/.config/batch-flow/config.toml` on Linux). Every field is optional;
//! CLI flags are layered on top with [`Config::apply_cli_overrides`].

use crate::cursor_store::default_state_path;
use crate::prefetch::{DEFAULT_WINDOW, MAX_WINDOW};
use crate::scan_spec::DEFAULT_EXTENSIONS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub state: StateConfig,
    pub prefetch: PrefetchConfig,
}

/// Defaults for invocation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory iterated when none is given on the command line
    pub root: Option<PathBuf>,
    pub extensions: String,
    pub recursive: bool,
    pub allow_transparency: bool,
    pub auto_refresh: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: DEFAULT_EXTENSIONS.to_string(),
            recursive: true,
            allow_transparency: true,
            auto_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Cursor record location; platform data dir when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub window: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl Config {
    /// Path of the configuration file.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "batch-flow")
            .context("Failed to determine configuration directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load the configuration file, falling back to defaults.
    ///
    /// A missing file is silent; an unreadable one is logged as a warning.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("{:#}", e);
                return Self::default();
            }
        };
        if !path.exists() {
            debug!("No config file at {}", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default configuration: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load, writing the defaults to disk first if no file exists yet.
    pub fn load_or_create() -> Self {
        if let Ok(path) = Self::config_path() {
            if !path.exists() {
                if let Err(e) = Self::default().save_to(&path) {
                    warn!("Failed to write default config: {:#}", e);
                }
            }
        }
        Self::load()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply command-line flags; `None` keeps the configured value.
    pub fn apply_cli_overrides(
        &mut self,
        extensions: Option<String>,
        recursive: Option<bool>,
        allow_transparency: Option<bool>,
        auto_refresh: Option<bool>,
        state_path: Option<PathBuf>,
    ) {
        if let Some(extensions) = extensions {
            self.scan.extensions = extensions;
        }
        if let Some(recursive) = recursive {
            self.scan.recursive = recursive;
        }
        if let Some(allow) = allow_transparency {
            self.scan.allow_transparency = allow;
        }
        if let Some(auto_refresh) = auto_refresh {
            self.scan.auto_refresh = auto_refresh;
        }
        if state_path.is_some() {
            self.state.path = state_path;
        }
    }

    /// Effective cursor record location.
    pub fn state_path(&self) -> PathBuf {
        self.state.path.clone().unwrap_or_else(default_state_path)
    }

    fn validate(&mut self) {
        if !(1..=MAX_WINDOW).contains(&self.prefetch.window) {
            let clamped = self.prefetch.window.clamp(1, MAX_WINDOW);
            warn!(
                "prefetch.window must be 1-{}, got {}; using {}",
                MAX_WINDOW, self.prefetch.window, clamped
            );
            self.prefetch.window = clamped;
        }
    }
}
