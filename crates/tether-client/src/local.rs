//! In-process client over an embedded database

use crate::client::AgentClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tether_agents::{AgentServer, AgentState, AgentUpdate, CreateAgent};
use tether_common::{EmbeddingConfig, LlmConfig, Result, TetherConfig, TetherError};
use tether_memory::{
    Block, BlockId, BlockQuery, Database, Memory, Message, MessageRole, Owner, Passage,
};
use tether_tools::{AiTool, Tool, ToolUpdate};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Client that runs the agent server in this process
pub struct LocalClient {
    server: Arc<AgentServer>,
    owner: Owner,
    default_llm: RwLock<Option<LlmConfig>>,
    default_embedding: RwLock<Option<EmbeddingConfig>>,
}

impl LocalClient {
    /// Open the configured store and act as the configured identity
    pub async fn connect(config: &TetherConfig) -> Result<Self> {
        let db = Database::connect(&config.storage).await?;
        let server = Arc::new(AgentServer::new(db, config.defaults.clone()));
        let owner = Owner::new(
            &config.identity.user_id,
            &config.identity.organization_id,
        );
        info!("Connected local client for {}", owner.user_id);
        Self::with_server(server, owner).await
    }

    /// A client over a fresh in-memory store with default settings
    pub async fn in_memory() -> Result<Self> {
        let mut config = TetherConfig::default();
        config.storage = tether_common::StorageConfig::in_memory();
        Self::connect(&config).await
    }

    /// Another user's client over the same server
    pub async fn with_server(server: Arc<AgentServer>, owner: Owner) -> Result<Self> {
        server.ensure_user(&owner).await?;
        Ok(Self {
            server,
            owner,
            default_llm: RwLock::new(None),
            default_embedding: RwLock::new(None),
        })
    }

    pub fn server(&self) -> &Arc<AgentServer> {
        &self.server
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// The agent, if it exists and belongs to this client's user
    async fn owned_agent(&self, agent_id: &str) -> Result<Option<AgentState>> {
        Ok(self
            .server
            .get_agent(agent_id)
            .await?
            .filter(|agent| agent.user_id == self.owner.user_id))
    }

    async fn check_agent(&self, agent_id: &str) -> Result<()> {
        match self.owned_agent(agent_id).await? {
            Some(_) => Ok(()),
            None => Err(TetherError::not_found("agent", agent_id)),
        }
    }

    fn owns(&self, user_id: Option<&str>) -> bool {
        user_id == Some(self.owner.user_id.as_str())
    }

    async fn check_tool(&self, tool_id: &str) -> Result<()> {
        match self.get_tool(tool_id).await? {
            Some(_) => Ok(()),
            None => Err(TetherError::not_found("tool", tool_id)),
        }
    }
}

#[async_trait]
impl AgentClient for LocalClient {
    fn user_id(&self) -> &str {
        &self.owner.user_id
    }

    async fn create_agent(&self, mut request: CreateAgent) -> Result<AgentState> {
        if request.llm_config.is_none() {
            request.llm_config = self.default_llm.read().await.clone();
        }
        if request.embedding_config.is_none() {
            request.embedding_config = self.default_embedding.read().await.clone();
        }
        self.server.create_agent(&self.owner, request).await
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentState>> {
        self.owned_agent(agent_id).await
    }

    async fn get_agent_id(&self, name: &str) -> Result<Option<String>> {
        self.server.get_agent_id(name, &self.owner.user_id).await
    }

    async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> Result<AgentState> {
        self.check_agent(agent_id).await?;
        self.server.update_agent(agent_id, update).await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<bool> {
        if self.owned_agent(agent_id).await?.is_none() {
            debug!("Agent {} already gone", agent_id);
            return Ok(false);
        }
        self.server.delete_agent(agent_id).await
    }

    async fn list_agents(&self) -> Result<Vec<AgentState>> {
        self.server.list_agents(&self.owner.user_id).await
    }

    async fn create_tool(&self, func: Arc<dyn AiTool>, tags: Vec<String>) -> Result<Tool> {
        self.server.tools().create_tool(&self.owner, func, tags).await
    }

    async fn add_tool(&self, tool: Tool) -> Result<Tool> {
        self.server.tools().add_tool(&self.owner, tool).await
    }

    async fn update_tool(&self, tool_id: &str, update: ToolUpdate) -> Result<Tool> {
        self.check_tool(tool_id).await?;
        self.server
            .update_tool(tool_id, update, &self.owner.user_id)
            .await
    }

    async fn get_tool(&self, tool_id: &str) -> Result<Option<Tool>> {
        Ok(self
            .server
            .tools()
            .get_tool(tool_id)
            .await?
            .filter(|tool| self.owns(tool.user_id.as_deref())))
    }

    async fn get_tool_id(&self, name: &str) -> Result<Option<String>> {
        self.server
            .tools()
            .get_tool_id(name, &self.owner.user_id)
            .await
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.server.tools().list_tools(&self.owner.user_id).await
    }

    async fn delete_tool(&self, tool_id: &str) -> Result<bool> {
        if self.get_tool(tool_id).await?.is_none() {
            return Ok(false);
        }
        self.server
            .tools()
            .delete_tool(tool_id, &self.owner.user_id)
            .await
    }

    async fn run_tool(&self, agent_id: &str, name: &str, args: Value) -> Result<Value> {
        self.check_agent(agent_id).await?;
        self.server.run_tool(agent_id, name, args).await
    }

    async fn add_tool_to_agent(&self, agent_id: &str, tool_id: &str) -> Result<AgentState> {
        self.check_agent(agent_id).await?;
        self.server.add_tool_to_agent(agent_id, tool_id).await
    }

    async fn remove_tool_from_agent(&self, agent_id: &str, tool_id: &str) -> Result<AgentState> {
        self.check_agent(agent_id).await?;
        self.server.remove_tool_from_agent(agent_id, tool_id).await
    }

    async fn get_in_context_memory(&self, agent_id: &str) -> Result<Memory> {
        self.check_agent(agent_id).await?;
        self.server.get_in_context_memory(agent_id).await
    }

    async fn update_in_context_memory(
        &self,
        agent_id: &str,
        section: &str,
        value: &str,
    ) -> Result<Memory> {
        self.check_agent(agent_id).await?;
        self.server
            .update_in_context_memory(agent_id, section, value)
            .await
    }

    async fn create_block(&self, block: Block) -> Result<Block> {
        self.server.blocks().create(block, &self.owner).await
    }

    async fn get_block(&self, block_id: &BlockId) -> Result<Option<Block>> {
        Ok(self
            .server
            .blocks()
            .get(block_id)
            .await?
            .filter(|block| self.owns(block.user_id.as_deref())))
    }

    async fn list_blocks(&self, templates: Option<bool>) -> Result<Vec<Block>> {
        self.server
            .blocks()
            .list(BlockQuery {
                user_id: Some(self.owner.user_id.clone()),
                templates,
                ..Default::default()
            })
            .await
    }

    async fn delete_block(&self, block_id: &BlockId) -> Result<bool> {
        if self.get_block(block_id).await?.is_none() {
            debug!("Block {} is not ours or already gone", block_id);
            return Ok(false);
        }
        self.server
            .blocks()
            .delete(block_id, &self.owner.user_id)
            .await
    }

    async fn insert_archival_memory(&self, agent_id: &str, text: &str) -> Result<Vec<Passage>> {
        self.check_agent(agent_id).await?;
        self.server.insert_archival_memory(agent_id, text).await
    }

    async fn get_archival_memory(&self, agent_id: &str) -> Result<Vec<Passage>> {
        self.check_agent(agent_id).await?;
        self.server.get_archival_memory(agent_id).await
    }

    async fn delete_archival_memory(&self, agent_id: &str, passage_id: &str) -> Result<bool> {
        self.check_agent(agent_id).await?;
        self.server.delete_archival_memory(agent_id, passage_id).await
    }

    async fn send_message(
        &self,
        agent_id: &str,
        message: &str,
        role: MessageRole,
    ) -> Result<Message> {
        self.check_agent(agent_id).await?;
        self.server.send_message(agent_id, message, role).await
    }

    async fn get_messages(&self, agent_id: &str) -> Result<Vec<Message>> {
        self.check_agent(agent_id).await?;
        self.server.get_messages(agent_id).await
    }

    async fn get_in_context_messages(&self, agent_id: &str) -> Result<Vec<Message>> {
        self.check_agent(agent_id).await?;
        self.server.get_in_context_messages(agent_id).await
    }

    async fn set_default_llm_config(&self, config: LlmConfig) {
        *self.default_llm.write().await = Some(config);
    }

    async fn set_default_embedding_config(&self, config: EmbeddingConfig) {
        *self.default_embedding.write().await = Some(config);
    }
}
