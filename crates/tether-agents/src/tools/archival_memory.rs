use anyhow::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tether_common::constants::base_tools;
use tether_tools::{AiTool, ToolContext};

use super::{AgentHandles, SEARCH_PAGE_SIZE, page_param, str_param};

/// Write a note to the agent's archival memory
pub struct ArchivalMemoryInsertTool {
    pub handles: AgentHandles,
}

#[async_trait]
impl AiTool for ArchivalMemoryInsertTool {
    fn name(&self) -> &str {
        base_tools::ARCHIVAL_MEMORY_INSERT
    }

    fn description(&self) -> &str {
        "Add to archival memory. Make sure to phrase the memory contents such that it can be easily queried later."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Content to write to the memory."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value, Error> {
        let content = str_param(&params, "content")?;
        let agent = self.handles.agent(ctx).await?;

        let passages = self
            .handles
            .archival
            .insert(
                &agent.id,
                &agent.owner(),
                content,
                agent.embedding_config.embedding_chunk_size,
            )
            .await?;

        Ok(json!({ "status": "OK", "passages": passages.len() }))
    }
}

/// Search the agent's archival memory
pub struct ArchivalMemorySearchTool {
    pub handles: AgentHandles,
}

#[async_trait]
impl AiTool for ArchivalMemorySearchTool {
    fn name(&self) -> &str {
        base_tools::ARCHIVAL_MEMORY_SEARCH
    }

    fn description(&self) -> &str {
        "Search archival memory using case-insensitive string matching."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "String to search for."
                },
                "page": {
                    "type": "integer",
                    "description": "Page of results to return, starting at 0."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value, Error> {
        let query = str_param(&params, "query")?;
        let page = page_param(&params)?;
        let agent = self.handles.agent(ctx).await?;

        let matches = self
            .handles
            .archival
            .search(&agent.id, query, usize::MAX)
            .await?;
        let total = matches.len();
        let results: Vec<Value> = matches
            .into_iter()
            .skip(page * SEARCH_PAGE_SIZE)
            .take(SEARCH_PAGE_SIZE)
            .map(|p| json!({ "id": p.id, "text": p.text }))
            .collect();

        Ok(json!({ "results": results, "page": page, "total": total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::server_with_agent;

    #[tokio::test]
    async fn test_insert_then_search() {
        let (server, agent, ctx) = server_with_agent().await;
        let insert = ArchivalMemoryInsertTool {
            handles: server.handles(),
        };
        let search = ArchivalMemorySearchTool {
            handles: server.handles(),
        };

        let out = insert
            .execute(&ctx, json!({ "content": "The user's cat is called Miso" }))
            .await
            .unwrap();
        assert_eq!(out["passages"], 1);

        let found = search
            .execute(&ctx, json!({ "query": "miso" }))
            .await
            .unwrap();
        assert_eq!(found["total"], 1);
        assert_eq!(found["results"][0]["text"], "The user's cat is called Miso");

        assert_eq!(server.get_archival_memory(&agent.id).await.unwrap().len(), 1);
    }
}
