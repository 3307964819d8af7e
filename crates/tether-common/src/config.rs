//! Configuration types and utilities for Tether

use crate::constants::{self, embeddings, models, providers};
use crate::error::{Result, TetherError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base configuration that all components can use
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    pub data_dir: String,
    pub log_level: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// The user and organization that a local client acts as
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: String,
    pub organization_id: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: constants::DEFAULT_USER_ID.to_string(),
            organization_id: constants::DEFAULT_ORG_ID.to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Storage path for file-based backends
    pub path: Option<PathBuf>,
    /// Namespace for multi-tenant storage
    pub namespace: String,
    /// Database name
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SurrealDB file-based storage
    SurrealFile,
    /// SurrealDB in-memory storage
    SurrealMemory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::SurrealFile,
            path: Some(PathBuf::from("./data/tether.db")),
            namespace: "tether".to_string(),
            database: "agents".to_string(),
        }
    }
}

impl StorageConfig {
    /// In-memory storage, used by tests and `--in-memory`
    pub fn in_memory() -> Self {
        Self {
            backend: StorageBackend::SurrealMemory,
            path: None,
            ..Default::default()
        }
    }
}

/// LLM endpoint configuration attached to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub model_endpoint_type: String,
    pub model_endpoint: Option<String>,
    pub context_window: u32,
}

impl LlmConfig {
    /// Known defaults for a model name
    pub fn default_config(model: &str) -> Result<Self> {
        let context_window = match model {
            models::GPT_4O_MINI | models::GPT_4O => 128_000,
            models::GPT_4 => 8_192,
            models::GPT_4_TURBO => 128_000,
            models::GPT_3_5_TURBO => 16_385,
            _ => {
                return Err(TetherError::Config(format!(
                    "no default LLM config for model '{}'",
                    model
                )));
            }
        };

        Ok(Self {
            model: model.to_string(),
            model_endpoint_type: providers::OPENAI.to_string(),
            model_endpoint: Some(providers::OPENAI_ENDPOINT.to_string()),
            context_window,
        })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: models::GPT_4O_MINI.to_string(),
            model_endpoint_type: providers::OPENAI.to_string(),
            model_endpoint: Some(providers::OPENAI_ENDPOINT.to_string()),
            context_window: 128_000,
        }
    }
}

/// Embedding endpoint configuration attached to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub embedding_model: String,
    pub embedding_endpoint_type: String,
    pub embedding_endpoint: Option<String>,
    pub embedding_dim: usize,
    /// Archival chunk size, in words
    pub embedding_chunk_size: usize,
}

impl EmbeddingConfig {
    /// Known defaults for an embedding provider
    pub fn default_config(provider: &str) -> Result<Self> {
        match provider {
            providers::OPENAI => Ok(Self::default()),
            providers::HUGGING_FACE => Ok(Self {
                embedding_model: embeddings::BGE_LARGE.to_string(),
                embedding_endpoint_type: providers::HUGGING_FACE.to_string(),
                embedding_endpoint: Some(providers::HUGGING_FACE_ENDPOINT.to_string()),
                embedding_dim: 1024,
                embedding_chunk_size: constants::DEFAULT_EMBEDDING_CHUNK_SIZE,
            }),
            other => Err(TetherError::Config(format!(
                "no default embedding config for provider '{}'",
                other
            ))),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_model: embeddings::ADA_002.to_string(),
            embedding_endpoint_type: providers::OPENAI.to_string(),
            embedding_endpoint: Some(providers::OPENAI_ENDPOINT.to_string()),
            embedding_dim: constants::DEFAULT_EMBEDDING_DIM,
            embedding_chunk_size: constants::DEFAULT_EMBEDDING_CHUNK_SIZE,
        }
    }
}

/// Defaults applied when an agent is created without explicit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Name of the human template block copied into new agents
    pub human_template: String,
    /// Name of the persona template block copied into new agents
    pub persona_template: String,
    pub system_prompt: String,
    pub block_char_limit: usize,
    pub max_in_context_messages: usize,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            human_template: constants::templates::DEFAULT_HUMAN.to_string(),
            persona_template: constants::templates::DEFAULT_PERSONA.to_string(),
            system_prompt: constants::DEFAULT_SYSTEM_PROMPT.to_string(),
            block_char_limit: constants::CORE_MEMORY_BLOCK_CHAR_LIMIT,
            max_in_context_messages: constants::DEFAULT_MAX_IN_CONTEXT_MESSAGES,
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub base: BaseConfig,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
    pub defaults: AgentDefaults,
}

impl TetherConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let mut config = if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let config_str = fs::read_to_string(config_path)?;
            toml::from_str(&config_str)?
        } else {
            debug!("No config at {:?}, using defaults", config_path);
            TetherConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let config_str =
            toml::to_string_pretty(self).map_err(|e| TetherError::Config(e.to_string()))?;
        fs::write(config_path, config_str)?;
        Ok(())
    }

    /// `TETHER_DATA_DIR`, `TETHER_LOG` and `TETHER_USER_ID` win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("TETHER_DATA_DIR") {
            self.set_data_dir(data_dir);
        }
        if let Ok(level) = std::env::var("TETHER_LOG") {
            self.base.log_level = level;
        }
        if let Ok(user_id) = std::env::var("TETHER_USER_ID") {
            self.identity.user_id = user_id;
        }
    }

    /// Point both the data dir and the file store at `data_dir`
    pub fn set_data_dir(&mut self, data_dir: impl Into<String>) {
        let data_dir = data_dir.into();
        self.storage.path = Some(PathBuf::from(&data_dir).join("tether.db"));
        self.base.data_dir = data_dir;
    }
}
