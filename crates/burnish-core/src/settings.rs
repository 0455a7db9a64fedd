//! Persistent user settings for Burnish
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/burnish/burnish_config.toml`
//! - macOS: `~/Library/Application Support/burnish/burnish_config.toml`
//! - Windows: `%APPDATA%\burnish\burnish_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [writer]
//! eject = true
//! allow_overburning = false
//! manual_buffer_size = true
//! buffer_size_mb = 8
//! burnfree = true
//! default_speed = 0
//!
//! [programs]
//! search_paths = ["/opt/schily/bin"]
//! cdrecord_parameters = ["-immed"]
//! wodim_parameters = []
//!
//! [behavior]
//! quiet = false
//! skip_confirmation = false
//! ```

use crate::backend::WriteRequest;
use crate::external::SearchPathLocator;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "burnish_config.toml";

/// Application name for config directory
const APP_NAME: &str = "burnish";

/// Backend fifo size used when a manual size is enabled without a value
const DEFAULT_BUFFER_SIZE_MB: u32 = 4;

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Writing defaults
    pub writer: WriterSettings,

    /// External program lookup
    pub programs: ProgramSettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,
}

/// Defaults folded into every write request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriterSettings {
    /// Eject the medium after writing
    pub eject: bool,

    /// Allow writing beyond the official capacity
    pub allow_overburning: bool,

    /// Pass `buffer_size_mb` to the backend instead of its default fifo size
    pub manual_buffer_size: bool,

    /// Backend fifo size in MB
    pub buffer_size_mb: u32,

    /// Request buffer underrun protection
    pub burnfree: bool,

    /// Speed factor used when none is given (0 = drive maximum)
    pub default_speed: u32,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            eject: true,
            allow_overburning: false,
            manual_buffer_size: false,
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
            burnfree: true,
            default_speed: 0,
        }
    }
}

/// Where backends are found and what they always get passed
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgramSettings {
    /// Directories searched before `$PATH`
    pub search_paths: Vec<PathBuf>,

    /// Extra arguments for every cdrecord run
    pub cdrecord_parameters: Vec<String>,

    /// Extra arguments for every wodim run
    pub wodim_parameters: Vec<String>,
}

/// General behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Whether to skip confirmation prompts by default
    pub skip_confirmation: bool,

    /// Whether to suppress non-error output
    pub quiet: bool,
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::try_load(&path) {
            Ok(settings) => {
                tracing::debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Self::default()
            }
        }
    }

    /// Load settings, reporting read and parse failures
    pub fn try_load(path: &std::path::Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(SettingsError::Deserialize)
    }

    /// Save settings to the configuration file
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        self.save_to_path(Self::config_path())
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }

    /// Fold the writer defaults into a request
    ///
    /// Speed is only filled in when the request leaves it at 0. Boolean
    /// toggles from the settings switch options on, never off.
    pub fn apply_to(&self, mut request: WriteRequest) -> WriteRequest {
        let writer = &self.writer;
        if request.speed == 0 {
            request.speed = writer.default_speed;
        }
        request.eject_on_finish |= writer.eject;
        request.overburn |= writer.allow_overburning;
        request.burnfree |= writer.burnfree;
        if writer.manual_buffer_size && request.buffer_size.is_none() {
            request.buffer_size = Some(writer.buffer_size_mb);
        }
        request
    }

    /// Build a binary locator from the program settings
    pub fn locator(&self) -> SearchPathLocator {
        SearchPathLocator::new()
            .search_paths(self.programs.search_paths.clone())
            .user_parameters("cdrecord", self.programs.cdrecord_parameters.clone())
            .user_parameters("wodim", self.programs.wodim_parameters.clone())
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),

    /// Failed to deserialize settings
    #[error("Failed to parse settings: {0}")]
    Deserialize(toml::de::Error),
}
