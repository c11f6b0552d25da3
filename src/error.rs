//! Error types for the recall engine.

use std::fmt;

use thiserror::Error;

/// Which kind of learning item an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Flashcard,
    Exercise,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flashcard => write!(f, "flashcard"),
            Self::Exercise => write!(f, "exercise"),
        }
    }
}

/// Errors raised by the text codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The item is no longer present in the document, so it was edited since it was read.
    #[error("{kind} '{id}' not found in document")]
    ItemNotFound { kind: ItemKind, id: String },
}

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
