//! The client facade every front end talks to

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tether_agents::{AgentState, AgentUpdate, CreateAgent};
use tether_common::{EmbeddingConfig, LlmConfig, Result};
use tether_memory::{Block, BlockId, Memory, Message, MessageRole, Passage};
use tether_tools::{AiTool, Tool, ToolUpdate};

/// Agents, tools and memory of one user
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// The user this client acts as
    fn user_id(&self) -> &str;

    // Agents

    async fn create_agent(&self, request: CreateAgent) -> Result<AgentState>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentState>>;

    async fn get_agent_id(&self, name: &str) -> Result<Option<String>>;

    async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> Result<AgentState>;

    /// Idempotent; returns whether a live agent was deleted
    async fn delete_agent(&self, agent_id: &str) -> Result<bool>;

    async fn list_agents(&self) -> Result<Vec<AgentState>>;

    // Tools

    async fn create_tool(&self, func: Arc<dyn AiTool>, tags: Vec<String>) -> Result<Tool>;

    async fn add_tool(&self, tool: Tool) -> Result<Tool>;

    async fn update_tool(&self, tool_id: &str, update: ToolUpdate) -> Result<Tool>;

    async fn get_tool(&self, tool_id: &str) -> Result<Option<Tool>>;

    async fn get_tool_id(&self, name: &str) -> Result<Option<String>>;

    async fn list_tools(&self) -> Result<Vec<Tool>>;

    async fn delete_tool(&self, tool_id: &str) -> Result<bool>;

    async fn run_tool(&self, agent_id: &str, name: &str, args: Value) -> Result<Value>;

    async fn add_tool_to_agent(&self, agent_id: &str, tool_id: &str) -> Result<AgentState>;

    async fn remove_tool_from_agent(&self, agent_id: &str, tool_id: &str) -> Result<AgentState>;

    // Core memory

    async fn get_in_context_memory(&self, agent_id: &str) -> Result<Memory>;

    async fn update_in_context_memory(
        &self,
        agent_id: &str,
        section: &str,
        value: &str,
    ) -> Result<Memory>;

    async fn create_block(&self, block: Block) -> Result<Block>;

    async fn get_block(&self, block_id: &BlockId) -> Result<Option<Block>>;

    /// `templates`: only templates, only non-templates, or both when `None`
    async fn list_blocks(&self, templates: Option<bool>) -> Result<Vec<Block>>;

    async fn delete_block(&self, block_id: &BlockId) -> Result<bool>;

    // Archival memory

    async fn insert_archival_memory(&self, agent_id: &str, text: &str) -> Result<Vec<Passage>>;

    async fn get_archival_memory(&self, agent_id: &str) -> Result<Vec<Passage>>;

    async fn delete_archival_memory(&self, agent_id: &str, passage_id: &str) -> Result<bool>;

    // Recall memory

    async fn send_message(
        &self,
        agent_id: &str,
        message: &str,
        role: MessageRole,
    ) -> Result<Message>;

    async fn get_messages(&self, agent_id: &str) -> Result<Vec<Message>>;

    async fn get_in_context_messages(&self, agent_id: &str) -> Result<Vec<Message>>;

    // Defaults for new agents

    async fn set_default_llm_config(&self, config: LlmConfig);

    async fn set_default_embedding_config(&self, config: EmbeddingConfig);
}
