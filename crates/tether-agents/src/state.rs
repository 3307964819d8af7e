//! Agent aggregate: persisted state plus the create and update requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tether_common::{EmbeddingConfig, LlmConfig, Result};
use tether_memory::{AuditColumns, BlockId, BlockMemory, BlockStore, Memory, Owner};

/// An agent as seen by callers. Memory holds block references, not copies.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// System prompt, without the rendered memory section
    pub system: String,
    pub memory: Memory,
    /// Attached tool names, unique, in attach order
    pub tools: Vec<String>,
    pub llm_config: LlmConfig,
    pub embedding_config: EmbeddingConfig,
    /// In-context message ids; the first one is the current system message
    pub message_ids: Vec<String>,
    pub metadata: Map<String, Value>,
    pub user_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentState {
    pub fn owner(&self) -> Owner {
        Owner::new(&self.user_id, &self.organization_id)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }
}

/// Request to create an agent. Unset fields take the server defaults.
#[derive(Debug, Clone, Default)]
pub struct CreateAgent {
    /// Generated when unset
    pub name: Option<String>,
    /// Fresh copies of the default human and persona templates when unset
    pub memory: Option<BlockMemory>,
    pub description: Option<String>,
    /// The base tools when unset
    pub tools: Option<Vec<String>>,
    pub llm_config: Option<LlmConfig>,
    pub embedding_config: Option<EmbeddingConfig>,
    pub system: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl CreateAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_memory(mut self, memory: BlockMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_llm_config(mut self, config: LlmConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    pub fn with_embedding_config(mut self, config: EmbeddingConfig) -> Self {
        self.embedding_config = Some(config);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Partial agent update; only the fields that are set are applied
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system: Option<String>,
    /// Replaces the whole tool list
    pub tools: Option<Vec<String>>,
    /// Replaces the block references; the old blocks are kept
    pub memory: Option<BlockMemory>,
    pub llm_config: Option<LlmConfig>,
    pub embedding_config: Option<EmbeddingConfig>,
    pub message_ids: Option<Vec<String>>,
    pub metadata: Option<Map<String, Value>>,
}

impl AgentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.system.is_none()
            && self.tools.is_none()
            && self.memory.is_none()
            && self.llm_config.is_none()
            && self.embedding_config.is_none()
            && self.message_ids.is_none()
            && self.metadata.is_none()
    }
}

/// Persisted form of an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgentRow {
    pub agent_id: String,
    pub name: String,
    pub description: Option<String>,
    pub system: String,
    /// JSON label → block id map
    pub memory: String,
    pub tools: Vec<String>,
    pub llm_config: String,
    pub embedding_config: String,
    pub message_ids: Vec<String>,
    pub metadata: String,
    pub user_id: String,
    pub organization_id: String,
    pub audit: AuditColumns,
}

impl AgentRow {
    pub fn new(state: &AgentState, actor: &str) -> Result<Self> {
        Ok(AgentRow {
            agent_id: state.id.clone(),
            name: state.name.clone(),
            description: state.description.clone(),
            system: state.system.clone(),
            memory: serde_json::to_string(state.memory.refs())?,
            tools: state.tools.clone(),
            llm_config: serde_json::to_string(&state.llm_config)?,
            embedding_config: serde_json::to_string(&state.embedding_config)?,
            message_ids: state.message_ids.clone(),
            metadata: serde_json::to_string(&state.metadata)?,
            user_id: state.user_id.clone(),
            organization_id: state.organization_id.clone(),
            audit: AuditColumns::created_at(actor, state.created_at),
        })
    }

    pub fn into_state(self, blocks: Arc<dyn BlockStore>) -> Result<AgentState> {
        let refs: BTreeMap<String, BlockId> = serde_json::from_str(&self.memory)?;
        Ok(AgentState {
            id: self.agent_id,
            name: self.name,
            description: self.description,
            system: self.system,
            memory: Memory::from_refs(blocks, refs),
            tools: self.tools,
            llm_config: serde_json::from_str(&self.llm_config)?,
            embedding_config: serde_json::from_str(&self.embedding_config)?,
            message_ids: self.message_ids,
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
            user_id: self.user_id,
            organization_id: self.organization_id,
            created_at: self.audit.created(),
            updated_at: self.audit.updated(),
        })
    }
}

/// Drop tool names already seen, keeping the first occurrence
pub(crate) fn dedup_tools(tools: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(tools.len());
    for tool in tools {
        if !unique.contains(&tool) {
            unique.push(tool);
        }
    }
    unique
}

/// Keep the window at `max` messages; the first (system) message always stays
pub(crate) fn trim_context(mut ids: Vec<String>, max: usize) -> Vec<String> {
    let max = max.max(1);
    if ids.len() > max {
        let excess = ids.len() - max;
        ids.drain(1..1 + excess);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{}", i)).collect()
    }

    #[test]
    fn test_trim_keeps_system_message() {
        assert_eq!(trim_context(ids(3), 5), ids(3));
        assert_eq!(trim_context(ids(5), 3), vec!["m0", "m3", "m4"]);
        assert_eq!(trim_context(ids(5), 1), vec!["m0"]);
        assert_eq!(trim_context(ids(5), 0), vec!["m0"]);
    }

    #[test]
    fn test_dedup_tools_keeps_order() {
        let tools = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedup_tools(tools), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_update_is_empty() {
        assert!(AgentUpdate::default().is_empty());
        let update = AgentUpdate {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
