//! Tether Common - Shared utilities and types
//!
//! This crate provides common error types, configuration structs,
//! and utility functions used across all Tether components.

pub mod config;
pub mod constants;
pub mod error;
pub mod utils;

// Re-export commonly used items
pub use config::{
    AgentDefaults, BaseConfig, EmbeddingConfig, IdentityConfig, LlmConfig, StorageBackend,
    StorageConfig, TetherConfig,
};
pub use error::{Result, TetherError};
pub use utils::*;
