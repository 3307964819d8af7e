//! Tether Common Error Types
//!
//! Centralized error handling for all Tether components

use std::fmt;

/// Main error type for Tether operations
#[derive(Debug)]
pub enum TetherError {
    /// Generic error with message
    Generic(String),
    /// IO-related errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(serde_json::Error),
    /// Database/storage errors
    Storage(String),
    /// Configuration errors
    Config(String),
    /// A row required by the operation does not exist
    NotFound { resource: &'static str, id: String },
    /// A unique name is already taken for this owner
    NameConflict { resource: &'static str, name: String },
    /// A unique key (id, or template label/name) already exists
    DuplicateKey { resource: &'static str, key: String },
    /// Tool source failed to compile
    Source(String),
    /// External tool import is missing required mapping metadata
    Import(String),
    /// Malformed input or patch fields
    Validation(String),
    /// Tool execution errors
    Tool(String),
}

impl TetherError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        TetherError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn name_conflict(resource: &'static str, name: impl Into<String>) -> Self {
        TetherError::NameConflict {
            resource,
            name: name.into(),
        }
    }

    pub fn duplicate_key(resource: &'static str, key: impl Into<String>) -> Self {
        TetherError::DuplicateKey {
            resource,
            key: key.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        TetherError::Validation(message.into())
    }

    pub fn storage(operation: &str, err: impl fmt::Display) -> Self {
        TetherError::Storage(format!("{}: {}", operation, err))
    }
}

impl fmt::Display for TetherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TetherError::Generic(msg) => write!(f, "Tether error: {}", msg),
            TetherError::Io(err) => write!(f, "IO error: {}", err),
            TetherError::Serde(err) => write!(f, "Serialization error: {}", err),
            TetherError::Storage(msg) => write!(f, "Storage error: {}", msg),
            TetherError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TetherError::NotFound { resource, id } => {
                write!(f, "{} not found: {}", resource, id)
            }
            TetherError::NameConflict { resource, name } => {
                write!(f, "{} named '{}' already exists", resource, name)
            }
            TetherError::DuplicateKey { resource, key } => {
                write!(f, "duplicate {} key: {}", resource, key)
            }
            TetherError::Source(msg) => write!(f, "Tool source error: {}", msg),
            TetherError::Import(msg) => write!(f, "Tool import error: {}", msg),
            TetherError::Validation(msg) => write!(f, "Validation error: {}", msg),
            TetherError::Tool(msg) => write!(f, "Tool error: {}", msg),
        }
    }
}

impl std::error::Error for TetherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TetherError::Io(err) => Some(err),
            TetherError::Serde(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenience result type for Tether operations
pub type Result<T> = std::result::Result<T, TetherError>;

// Implement From traits for common error types
impl From<std::io::Error> for TetherError {
    fn from(err: std::io::Error) -> Self {
        TetherError::Io(err)
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Serde(err)
    }
}

impl From<toml::de::Error> for TetherError {
    fn from(err: toml::de::Error) -> Self {
        TetherError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for TetherError {
    fn from(err: anyhow::Error) -> Self {
        TetherError::Generic(err.to_string())
    }
}
