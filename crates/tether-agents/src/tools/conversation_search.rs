use anyhow::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tether_common::constants::base_tools;
use tether_common::format_timestamp;
use tether_tools::{AiTool, ToolContext};

use super::{AgentHandles, SEARCH_PAGE_SIZE, page_param, str_param};

/// Search the agent's whole message history
pub struct ConversationSearchTool {
    pub handles: AgentHandles,
}

#[async_trait]
impl AiTool for ConversationSearchTool {
    fn name(&self) -> &str {
        base_tools::CONVERSATION_SEARCH
    }

    fn description(&self) -> &str {
        "Search prior conversation history using case-insensitive string matching."
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
            .recall
            .search(&agent.id, query, usize::MAX)
            .await?;
        let total = matches.len();
        let results: Vec<String> = matches
            .iter()
            .skip(page * SEARCH_PAGE_SIZE)
            .take(SEARCH_PAGE_SIZE)
            .map(|m| format!("timestamp: {}, {}", format_timestamp(m.created_at), m))
            .collect();

        Ok(json!({ "results": results, "page": page, "total": total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::server_with_agent;
    use tether_memory::MessageRole;

    #[tokio::test]
    async fn test_search_pages_through_history() {
        let (server, agent, ctx) = server_with_agent().await;
        for i in 0..7 {
            server
                .send_message(&agent.id, &format!("Favourite colour {}", i), MessageRole::User)
                .await
                .unwrap();
        }

        let tool = ConversationSearchTool {
            handles: server.handles(),
        };
        let first = tool
            .execute(&ctx, json!({ "query": "COLOUR" }))
            .await
            .unwrap();
        assert_eq!(first["total"], 7);
        assert_eq!(first["results"].as_array().unwrap().len(), SEARCH_PAGE_SIZE);

        let second = tool
            .execute(&ctx, json!({ "query": "colour", "page": 1 }))
            .await
            .unwrap();
        assert_eq!(second["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_rejects_foreign_agent() {
        let (server, _agent, ctx) = server_with_agent().await;
        let tool = ConversationSearchTool {
            handles: server.handles(),
        };
        let foreign = ToolContext::new(&ctx.agent_id, "user-2");
        assert!(tool.execute(&foreign, json!({ "query": "x" })).await.is_err());
    }
}
