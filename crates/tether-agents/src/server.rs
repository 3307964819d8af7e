//! Agent server: the single entry point that reconciles agents with their
//! blocks, tools and message history

use crate::state::{AgentRow, AgentState, AgentUpdate, CreateAgent, dedup_tools, trim_context};
use crate::store::AgentStore;
use crate::tools::{AgentHandles, base_tools};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tether_common::constants::{base_tools as base_tool_names, labels};
use tether_common::{AgentDefaults, Result, TetherError, generate_id, now_rfc3339};
use tether_memory::{
    ArchivalMemory, BlockBuilder, BlockMemory, BlockStore, Database, Memory, Message, MessageRole,
    Owner, Passage, RecallMemory, SurrealBlockStore, Tenancy,
};
use tether_tools::{AiTool, Tool, ToolContext, ToolRegistry, ToolUpdate};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Owns every store and the tool registry
pub struct AgentServer {
    defaults: AgentDefaults,
    blocks: Arc<dyn BlockStore>,
    agents: AgentStore,
    tools: ToolRegistry,
    recall: RecallMemory,
    archival: ArchivalMemory,
    tenancy: Tenancy,
    base_tools: Vec<Arc<dyn AiTool>>,
    /// Users whose templates and base tools are in place
    seeded: Mutex<HashSet<String>>,
    /// One lock per agent; held across every read-modify-write of an agent row
    agent_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentServer {
    pub fn new(db: Database, defaults: AgentDefaults) -> Self {
        let blocks: Arc<dyn BlockStore> = Arc::new(SurrealBlockStore::new(db.clone()));
        let agents = AgentStore::new(db.clone(), blocks.clone());
        let recall = RecallMemory::new(db.clone());
        let archival = ArchivalMemory::new(db.clone());
        let base_tools = base_tools(AgentHandles {
            agents: agents.clone(),
            recall: recall.clone(),
            archival: archival.clone(),
        });

        Self {
            defaults,
            blocks,
            agents,
            tools: ToolRegistry::new(db.clone()),
            recall,
            archival,
            tenancy: Tenancy::new(db),
            base_tools,
            seeded: Mutex::new(HashSet::new()),
            agent_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn agent_lock(&self, agent_id: &str) -> Arc<Mutex<()>> {
        self.agent_locks
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }

    pub fn defaults(&self) -> &AgentDefaults {
        &self.defaults
    }

    pub fn blocks(&self) -> Arc<dyn BlockStore> {
        self.blocks.clone()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The stores the base tools work on
    pub fn handles(&self) -> AgentHandles {
        AgentHandles {
            agents: self.agents.clone(),
            recall: self.recall.clone(),
            archival: self.archival.clone(),
        }
    }

    /// Create the owner's tenancy rows, default templates and base tools once
    /// per process. Base tools are rebound on every start.
    pub async fn ensure_user(&self, owner: &Owner) -> Result<()> {
        let mut seeded = self.seeded.lock().await;
        if seeded.contains(&owner.user_id) {
            return Ok(());
        }

        self.tenancy.ensure(owner).await?;
        self.seed_template(owner, labels::HUMAN, &self.defaults.human_template)
            .await?;
        self.seed_template(owner, labels::PERSONA, &self.defaults.persona_template)
            .await?;
        for tool in &self.base_tools {
            self.tools.register_native(owner, tool.clone()).await?;
        }

        seeded.insert(owner.user_id.clone());
        debug!("Seeded templates and base tools for {}", owner.user_id);
        Ok(())
    }

    async fn seed_template(&self, owner: &Owner, label: &str, name: &str) -> Result<()> {
        if self
            .blocks
            .get_template(label, name, &owner.user_id)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let Some(value) = builtin_template(label, name) else {
            warn!("No built-in {} template named '{}'", label, name);
            return Ok(());
        };

        let template = BlockBuilder::new(label)
            .with_value(value)
            .with_limit(self.defaults.block_char_limit)
            .template(name)
            .build()?;
        self.blocks.create(template, owner).await?;
        Ok(())
    }

    pub async fn create_agent(&self, owner: &Owner, request: CreateAgent) -> Result<AgentState> {
        self.ensure_user(owner).await?;

        let name = match request.name {
            Some(name) => name.trim().to_string(),
            None => generate_id("agent"),
        };
        if name.is_empty() {
            return Err(TetherError::validation("agent name must not be empty"));
        }
        if self
            .agents
            .get_by_name(&name, &owner.user_id)
            .await?
            .is_some()
        {
            return Err(TetherError::name_conflict("agent", name));
        }

        let tools = dedup_tools(request.tools.unwrap_or_else(|| {
            base_tool_names::ALL
                .iter()
                .map(|name| name.to_string())
                .collect()
        }));
        self.check_tools(&tools, &owner.user_id).await?;

        let layout = match request.memory {
            Some(layout) => layout,
            None => self.default_memory(owner).await?,
        };
        let memory = Memory::resolve(self.blocks.clone(), layout, owner).await?;

        let now = Utc::now();
        let mut state = AgentState {
            id: generate_id("agent"),
            name,
            description: request.description,
            system: request
                .system
                .unwrap_or_else(|| self.defaults.system_prompt.clone()),
            memory,
            tools,
            llm_config: request
                .llm_config
                .unwrap_or_else(|| self.defaults.llm.clone()),
            embedding_config: request
                .embedding_config
                .unwrap_or_else(|| self.defaults.embedding.clone()),
            message_ids: Vec::new(),
            metadata: request.metadata.unwrap_or_default(),
            user_id: owner.user_id.clone(),
            organization_id: owner.organization_id.clone(),
            created_at: now,
            updated_at: now,
        };

        let system_message = self.append_system_message(&state).await?;
        let login = self
            .recall
            .append(Message::new(
                &state.id,
                &owner.user_id,
                MessageRole::User,
                login_event(),
            ))
            .await?;
        state.message_ids = vec![system_message.id, login.id];

        let agent = self
            .agents
            .create(&AgentRow::new(&state, &owner.user_id)?)
            .await?;
        info!("Created agent '{}' ({})", agent.name, agent.id);
        Ok(agent)
    }

    /// Fresh copies of the default human and persona templates
    async fn default_memory(&self, owner: &Owner) -> Result<BlockMemory> {
        let mut blocks = Vec::new();
        for (label, name) in [
            (labels::HUMAN, &self.defaults.human_template),
            (labels::PERSONA, &self.defaults.persona_template),
        ] {
            let template = self
                .blocks
                .get_template(label, name, &owner.user_id)
                .await?
                .ok_or_else(|| {
                    TetherError::not_found("block template", format!("{}/{}", label, name))
                })?;
            blocks.push(template.instantiate());
        }
        BlockMemory::new(blocks)
    }

    async fn check_tools(&self, tools: &[String], user_id: &str) -> Result<()> {
        for name in tools {
            if self.tools.get_tool_by_name(name, user_id).await?.is_none() {
                return Err(TetherError::not_found("tool", name.clone()));
            }
        }
        Ok(())
    }

    pub async fn get_agent(&self, id: &str) -> Result<Option<AgentState>> {
        self.agents.get(id).await
    }

    pub async fn get_agent_id(&self, name: &str, user_id: &str) -> Result<Option<String>> {
        Ok(self.agents.get_by_name(name, user_id).await?.map(|a| a.id))
    }

    pub async fn list_agents(&self, user_id: &str) -> Result<Vec<AgentState>> {
        self.agents.list(user_id).await
    }

    async fn require_agent(&self, id: &str) -> Result<AgentState> {
        self.agents
            .get(id)
            .await?
            .ok_or_else(|| TetherError::not_found("agent", id))
    }

    /// Apply the fields that are set. Every field is checked before anything
    /// is written, and the agent row is written once.
    pub async fn update_agent(&self, id: &str, update: AgentUpdate) -> Result<AgentState> {
        let lock = self.agent_lock(id).await;
        let _guard = lock.lock().await;
        let current = self.require_agent(id).await?;
        if update.is_empty() {
            return Ok(current);
        }

        let mut patch = Map::new();
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TetherError::validation("agent name must not be empty"));
            }
            if let Some(other) = self.agents.get_by_name(&name, &current.user_id).await? {
                if other.id != current.id {
                    return Err(TetherError::name_conflict("agent", name));
                }
            }
            patch.insert("name".to_string(), json!(name));
        }
        if let Some(description) = update.description {
            patch.insert("description".to_string(), json!(description));
        }
        if let Some(tools) = update.tools {
            let tools = dedup_tools(tools);
            self.check_tools(&tools, &current.user_id).await?;
            patch.insert("tools".to_string(), json!(tools));
        }
        if let Some(llm_config) = &update.llm_config {
            patch.insert(
                "llm_config".to_string(),
                json!(serde_json::to_string(llm_config)?),
            );
        }
        if let Some(embedding_config) = &update.embedding_config {
            patch.insert(
                "embedding_config".to_string(),
                json!(serde_json::to_string(embedding_config)?),
            );
        }
        if let Some(metadata) = &update.metadata {
            patch.insert(
                "metadata".to_string(),
                json!(serde_json::to_string(metadata)?),
            );
        }

        let mut message_ids = current.message_ids.clone();
        let mut ids_changed = false;
        if let Some(ids) = update.message_ids {
            self.check_message_ids(&current.id, &ids).await?;
            message_ids = trim_context(ids, self.defaults.max_in_context_messages);
            ids_changed = true;
        }

        let mut state = current.clone();
        let rebuild = update.memory.is_some() || update.system.is_some();
        if let Some(system) = update.system {
            patch.insert("system".to_string(), json!(system));
            state.system = system;
        }
        if let Some(layout) = update.memory {
            state.memory = Memory::resolve(self.blocks.clone(), layout, &current.owner()).await?;
            patch.insert(
                "memory".to_string(),
                json!(serde_json::to_string(state.memory.refs())?),
            );
        }
        if rebuild {
            let system_message = self.append_system_message(&state).await?;
            message_ids = trim_context(
                with_system_message(message_ids, system_message.id),
                self.defaults.max_in_context_messages,
            );
            ids_changed = true;
        }
        if ids_changed {
            patch.insert("message_ids".to_string(), json!(message_ids));
        }

        let agent = self
            .agents
            .update(id, Value::Object(patch), &current.user_id)
            .await?;
        debug!("Updated agent '{}' ({})", agent.name, agent.id);
        Ok(agent)
    }

    async fn check_message_ids(&self, agent_id: &str, ids: &[String]) -> Result<()> {
        let found = self.recall.get_many(ids).await?;
        if found.len() != ids.len() || found.iter().any(|m| m.agent_id != agent_id) {
            return Err(TetherError::validation(format!(
                "message_ids must name existing messages of agent {}",
                agent_id
            )));
        }
        Ok(())
    }

    /// Delete an agent with its messages and archival memory. Blocks are
    /// kept since other agents may reference them.
    pub async fn delete_agent(&self, id: &str) -> Result<bool> {
        let lock = self.agent_lock(id).await;
        let _guard = lock.lock().await;
        let Some(agent) = self.agents.get(id).await? else {
            return Ok(false);
        };

        let deleted = self.agents.delete(id, &agent.user_id).await?;
        let messages = self.recall.delete_for_agent(id, &agent.user_id).await?;
        let passages = self.archival.delete_for_agent(id, &agent.user_id).await?;
        self.agent_locks.lock().await.remove(id);
        info!(
            "Deleted agent '{}' ({}) with {} message(s) and {} passage(s)",
            agent.name, id, messages, passages
        );
        Ok(deleted)
    }

    pub async fn add_tool_to_agent(&self, agent_id: &str, tool_id: &str) -> Result<AgentState> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;
        let agent = self.require_agent(agent_id).await?;
        let tool = self.agent_tool(&agent, tool_id).await?;
        if agent.has_tool(&tool.name) {
            return Ok(agent);
        }

        let mut tools = agent.tools.clone();
        tools.push(tool.name);
        self.agents
            .update(agent_id, json!({ "tools": tools }), &agent.user_id)
            .await
    }

    pub async fn remove_tool_from_agent(&self, agent_id: &str, tool_id: &str) -> Result<AgentState> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;
        let agent = self.require_agent(agent_id).await?;
        let tool = self.agent_tool(&agent, tool_id).await?;
        if !agent.has_tool(&tool.name) {
            return Ok(agent);
        }

        let tools: Vec<String> = agent
            .tools
            .iter()
            .filter(|name| **name != tool.name)
            .cloned()
            .collect();
        self.agents
            .update(agent_id, json!({ "tools": tools }), &agent.user_id)
            .await
    }

    /// Update a tool; a rename is carried into the tool lists of the owner's agents
    pub async fn update_tool(&self, tool_id: &str, update: ToolUpdate, actor: &str) -> Result<Tool> {
        let before = self
            .tools
            .get_tool(tool_id)
            .await?
            .ok_or_else(|| TetherError::not_found("tool", tool_id))?;
        let tool = self.tools.update_tool(tool_id, update, actor).await?;
        if tool.name == before.name {
            return Ok(tool);
        }

        let Some(user_id) = tool.user_id.as_deref() else {
            return Ok(tool);
        };
        for listed in self.agents.list(user_id).await? {
            if !listed.has_tool(&before.name) {
                continue;
            }
            let lock = self.agent_lock(&listed.id).await;
            let _guard = lock.lock().await;
            let Some(agent) = self.agents.get(&listed.id).await? else {
                continue;
            };
            let tools: Vec<String> = agent
                .tools
                .iter()
                .map(|name| {
                    if *name == before.name {
                        tool.name.clone()
                    } else {
                        name.clone()
                    }
                })
                .collect();
            self.agents
                .update(&agent.id, json!({ "tools": dedup_tools(tools) }), actor)
                .await?;
            debug!(
                "Renamed tool '{}' to '{}' on agent {}",
                before.name, tool.name, agent.id
            );
        }
        Ok(tool)
    }

    async fn agent_tool(&self, agent: &AgentState, tool_id: &str) -> Result<Tool> {
        let tool = self
            .tools
            .get_tool(tool_id)
            .await?
            .ok_or_else(|| TetherError::not_found("tool", tool_id))?;
        if tool.user_id.as_deref() != Some(agent.user_id.as_str()) {
            return Err(TetherError::validation(format!(
                "tool {} does not belong to the owner of agent {}",
                tool_id, agent.id
            )));
        }
        Ok(tool)
    }

    pub async fn get_in_context_memory(&self, agent_id: &str) -> Result<Memory> {
        Ok(self.require_agent(agent_id).await?.memory)
    }

    /// Write one memory section and refresh the agent's system message
    pub async fn update_in_context_memory(
        &self,
        agent_id: &str,
        label: &str,
        value: &str,
    ) -> Result<Memory> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;
        let agent = self.require_agent(agent_id).await?;
        agent
            .memory
            .update_block_value(label, value, &agent.user_id)
            .await?;
        let agent = self.refresh_system_message(agent).await?;
        Ok(agent.memory)
    }

    pub async fn insert_archival_memory(&self, agent_id: &str, text: &str) -> Result<Vec<Passage>> {
        let agent = self.require_agent(agent_id).await?;
        self.archival
            .insert(
                agent_id,
                &agent.owner(),
                text,
                agent.embedding_config.embedding_chunk_size,
            )
            .await
    }

    pub async fn get_archival_memory(&self, agent_id: &str) -> Result<Vec<Passage>> {
        self.require_agent(agent_id).await?;
        self.archival.list(agent_id).await
    }

    pub async fn delete_archival_memory(&self, agent_id: &str, passage_id: &str) -> Result<bool> {
        let agent = self.require_agent(agent_id).await?;
        self.archival
            .delete(agent_id, passage_id, &agent.user_id)
            .await
    }

    /// Record a message in recall and the agent's context window
    pub async fn send_message(
        &self,
        agent_id: &str,
        text: &str,
        role: MessageRole,
    ) -> Result<Message> {
        if role == MessageRole::Tool {
            return Err(TetherError::validation(
                "tool messages are recorded by running a tool",
            ));
        }
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;
        let agent = self.require_agent(agent_id).await?;
        let message = self
            .recall
            .append(Message::new(agent_id, &agent.user_id, role, text))
            .await?;

        let mut message_ids = agent.message_ids.clone();
        message_ids.push(message.id.clone());
        self.set_message_ids(&agent, message_ids).await?;
        Ok(message)
    }

    pub async fn get_messages(&self, agent_id: &str) -> Result<Vec<Message>> {
        self.require_agent(agent_id).await?;
        self.recall.list(agent_id).await
    }

    pub async fn get_in_context_messages(&self, agent_id: &str) -> Result<Vec<Message>> {
        let agent = self.require_agent(agent_id).await?;
        self.recall.get_many(&agent.message_ids).await
    }

    /// Run one of the agent's tools and record the result as a tool message
    pub async fn run_tool(&self, agent_id: &str, name: &str, args: Value) -> Result<Value> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;
        let agent = self.require_agent(agent_id).await?;
        if !agent.has_tool(name) {
            return Err(TetherError::validation(format!(
                "tool '{}' is not attached to agent {}",
                name, agent_id
            )));
        }

        let ctx = ToolContext::new(agent_id, &agent.user_id);
        let output = self.tools.run_tool(&ctx, name, args).await?;

        let message = self
            .recall
            .append(Message::tool(
                agent_id,
                &agent.user_id,
                name,
                output.to_string(),
            ))
            .await?;
        let mut message_ids = agent.message_ids.clone();
        message_ids.push(message.id);
        let agent = self.set_message_ids(&agent, message_ids).await?;

        if name == base_tool_names::CORE_MEMORY_APPEND || name == base_tool_names::CORE_MEMORY_REPLACE
        {
            self.refresh_system_message(agent).await?;
        }
        Ok(output)
    }

    async fn set_message_ids(&self, agent: &AgentState, ids: Vec<String>) -> Result<AgentState> {
        let ids = trim_context(ids, self.defaults.max_in_context_messages);
        self.agents
            .update(&agent.id, json!({ "message_ids": ids }), &agent.user_id)
            .await
    }

    async fn refresh_system_message(&self, agent: AgentState) -> Result<AgentState> {
        let system_message = self.append_system_message(&agent).await?;
        let ids = with_system_message(agent.message_ids.clone(), system_message.id);
        self.set_message_ids(&agent, ids).await
    }

    /// Render the system prompt with the current memory and append it to recall
    async fn append_system_message(&self, agent: &AgentState) -> Result<Message> {
        let memory = agent.memory.compile().await?;
        let recall_count = self.recall.count(&agent.id).await?;
        let archival_count = self.archival.list(&agent.id).await?.len();
        let text = format!(
            "{}\n\n### Memory [last modified: {}]\n\
             {} previous messages between you and the user are stored in recall memory\n\
             {} total memories you created are stored in archival memory\n\n\
             Core memory shown below:\n{}",
            agent.system,
            now_rfc3339(),
            recall_count,
            archival_count,
            memory
        );
        self.recall
            .append(Message::new(
                &agent.id,
                &agent.user_id,
                MessageRole::System,
                text,
            ))
            .await
    }
}

fn builtin_template(label: &str, name: &str) -> Option<&'static str> {
    use tether_common::constants::templates;
    match (label, name) {
        (labels::HUMAN, templates::DEFAULT_HUMAN) => Some(templates::BASIC_HUMAN),
        (labels::PERSONA, templates::DEFAULT_PERSONA) => Some(templates::SAM_PERSONA),
        _ => None,
    }
}

fn with_system_message(mut ids: Vec<String>, system_id: String) -> Vec<String> {
    if ids.is_empty() {
        ids.push(system_id);
    } else {
        ids[0] = system_id;
    }
    ids
}

fn login_event() -> String {
    json!({
        "type": "login",
        "last_login": "Never (first login)",
        "time": now_rfc3339(),
    })
    .to_string()
}
