use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Document opened by the CLI when no path is given on the command line.
    #[serde(default)]
    pub notes_path: Option<PathBuf>,
    /// Scheme prefixed onto bare-host URLs entered in the link dialog.
    #[serde(default = "defaults::link_scheme")]
    pub default_link_scheme: String,
    /// Stay in edit mode after a save, for rapid successive edits.
    #[serde(default)]
    pub keep_editing_after_save: bool,
    /// Coalescing delay for toolbar repositioning, in milliseconds.
    #[serde(default = "defaults::toolbar_debounce_ms")]
    pub toolbar_debounce_ms: u64,
    /// Grace window after a modal closes during which selection events are
    /// ignored, in milliseconds.
    #[serde(default = "defaults::modal_guard_ms")]
    pub modal_guard_ms: u64,
}

mod defaults {
    pub fn link_scheme() -> String {
        "https".to_string()
    }

    pub fn toolbar_debounce_ms() -> u64 {
        40
    }

    pub fn modal_guard_ms() -> u64 {
        400
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_path: None,
            default_link_scheme: defaults::link_scheme(),
            keep_editing_after_save: false,
            toolbar_debounce_ms: defaults::toolbar_debounce_ms(),
            modal_guard_ms: defaults::modal_guard_ms(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in the loaded document path
        if let Some(path) = &config.notes_path {
            config.notes_path = Some(Self::expand_path(path).unwrap_or_else(|| path.clone()));
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/spanmark");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}
