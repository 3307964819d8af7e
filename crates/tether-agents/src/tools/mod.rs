//! Base tools every agent starts with
//!
//! Each tool resolves the calling agent from the [`ToolContext`] and works on
//! that agent's memory, so one tool instance serves every agent of every user.

pub mod archival_memory;
pub mod conversation_search;
pub mod core_memory;
pub mod send_message;

pub use archival_memory::{ArchivalMemoryInsertTool, ArchivalMemorySearchTool};
pub use conversation_search::ConversationSearchTool;
pub use core_memory::{CoreMemoryAppendTool, CoreMemoryReplaceTool};
pub use send_message::SendMessageTool;

use crate::state::AgentState;
use crate::store::AgentStore;
use anyhow::{Result, anyhow};
use serde_json::Value;
use std::sync::Arc;
use tether_memory::{ArchivalMemory, RecallMemory};
use tether_tools::{AiTool, ToolContext};

/// Results returned per page by the search tools
pub const SEARCH_PAGE_SIZE: usize = 5;

/// Stores the base tools read and write
#[derive(Clone)]
pub struct AgentHandles {
    pub agents: AgentStore,
    pub recall: RecallMemory,
    pub archival: ArchivalMemory,
}

impl AgentHandles {
    /// The agent a tool is running for
    pub async fn agent(&self, ctx: &ToolContext) -> Result<AgentState> {
        let agent = self
            .agents
            .get(&ctx.agent_id)
            .await?
            .ok_or_else(|| anyhow!("Agent not found: {}", ctx.agent_id))?;
        if agent.user_id != ctx.user_id {
            return Err(anyhow!(
                "Agent {} does not belong to {}",
                ctx.agent_id,
                ctx.user_id
            ));
        }
        Ok(agent)
    }
}

/// One instance of every base tool
pub fn base_tools(handles: AgentHandles) -> Vec<Arc<dyn AiTool>> {
    vec![
        Arc::new(SendMessageTool),
        Arc::new(ConversationSearchTool {
            handles: handles.clone(),
        }),
        Arc::new(ArchivalMemoryInsertTool {
            handles: handles.clone(),
        }),
        Arc::new(ArchivalMemorySearchTool {
            handles: handles.clone(),
        }),
        Arc::new(CoreMemoryAppendTool {
            handles: handles.clone(),
        }),
        Arc::new(CoreMemoryReplaceTool { handles }),
    ]
}

pub(crate) fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing {}", key))
}

/// Zero-based page number, defaulting to the first page
pub(crate) fn page_param(params: &Value) -> Result<usize> {
    match params.get("page") {
        None | Some(Value::Null) => Ok(0),
        Some(page) => page
            .as_u64()
            .map(|p| p as usize)
            .ok_or_else(|| anyhow!("page must be a non-negative integer")),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::server::AgentServer;
    use crate::state::CreateAgent;
    use tether_common::AgentDefaults;
    use tether_memory::{Database, Owner};

    pub async fn server_with_agent() -> (AgentServer, AgentState, ToolContext) {
        let server = AgentServer::new(Database::in_memory().await.unwrap(), AgentDefaults::default());
        let owner = Owner::new("user-1", "org-1");
        let agent = server
            .create_agent(&owner, CreateAgent::new("tool_agent"))
            .await
            .unwrap();
        let ctx = ToolContext::new(&agent.id, "user-1");
        (server, agent, ctx)
    }
}
