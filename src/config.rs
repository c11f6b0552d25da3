//! Configuration persistence for the recall CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::recall::ItemFilter;

/// Settings that persist between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of items in a planned session.
    #[serde(default = "default_session_limit")]
    pub session_limit: usize,

    /// Which item kinds sessions draw from.
    #[serde(default)]
    pub filter: ItemFilter,

    /// Offer early review when nothing is due.
    #[serde(default)]
    pub early_review: bool,

    /// Heading new flashcards are appended under.
    #[serde(default = "default_flashcard_section")]
    pub flashcard_section: String,

    /// Heading new exercises are appended under.
    #[serde(default = "default_exercise_section")]
    pub exercise_section: String,
}

fn default_session_limit() -> usize {
    20
}

fn default_flashcard_section() -> String {
    "Flashcards".to_string()
}

fn default_exercise_section() -> String {
    "Exercises".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_limit: default_session_limit(),
            filter: ItemFilter::default(),
            early_review: false,
            flashcard_section: default_flashcard_section(),
            exercise_section: default_exercise_section(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("srl-recall")
            .join("config.toml")
    }

    /// Load config from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from `path`, returning defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {:?}; using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path())
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_err)?;

        Ok(())
    }
}
