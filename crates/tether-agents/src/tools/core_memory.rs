use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use tether_common::constants::base_tools;
use tether_tools::{AiTool, ToolContext};

use super::{AgentHandles, str_param};

/// Append to a core memory block
pub struct CoreMemoryAppendTool {
    pub handles: AgentHandles,
}

#[async_trait]
impl AiTool for CoreMemoryAppendTool {
    fn name(&self) -> &str {
        base_tools::CORE_MEMORY_APPEND
    }

    fn description(&self) -> &str {
        "Append to the contents of core memory."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {
                    "type": "string",
                    "description": "Section of the memory to be edited (persona or human)."
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the memory."
                }
            },
            "required": ["label", "content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value, Error> {
        let label = str_param(&params, "label")?;
        let content = str_param(&params, "content")?;
        let agent = self.handles.agent(ctx).await?;

        let block = agent
            .memory
            .get_block(label)
            .await?
            .ok_or_else(|| anyhow!("No memory section '{}'", label))?;
        let value = if block.value.is_empty() {
            content.to_string()
        } else {
            format!("{}\n{}", block.value, content)
        };
        let block = agent
            .memory
            .update_block_value(label, &value, &ctx.user_id)
            .await?;

        Ok(json!({ "status": "OK", "label": label, "characters": block.char_count() }))
    }
}

/// Replace text inside a core memory block
pub struct CoreMemoryReplaceTool {
    pub handles: AgentHandles,
}

#[async_trait]
impl AiTool for CoreMemoryReplaceTool {
    fn name(&self) -> &str {
        base_tools::CORE_MEMORY_REPLACE
    }

    fn description(&self) -> &str {
        "Replace the contents of core memory. To delete memories, use an empty string for new_content."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {
                    "type": "string",
                    "description": "Section of the memory to be edited (persona or human)."
                },
                "old_content": {
                    "type": "string",
                    "description": "String to replace. Must be an exact match."
                },
                "new_content": {
                    "type": "string",
                    "description": "Content to write to the memory."
                }
            },
            "required": ["label", "old_content", "new_content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value, Error> {
        let label = str_param(&params, "label")?;
        let old_content = str_param(&params, "old_content")?;
        let new_content = str_param(&params, "new_content")?;
        if old_content.is_empty() {
            return Err(anyhow!("old_content must not be empty"));
        }
        let agent = self.handles.agent(ctx).await?;

        let block = agent
            .memory
            .get_block(label)
            .await?
            .ok_or_else(|| anyhow!("No memory section '{}'", label))?;
        if !block.value.contains(old_content) {
            return Err(anyhow!(
                "Old content '{}' not found in memory section '{}'",
                old_content,
                label
            ));
        }
        let value = block.value.replace(old_content, new_content);
        let block = agent
            .memory
            .update_block_value(label, &value, &ctx.user_id)
            .await?;

        Ok(json!({ "status": "OK", "label": label, "characters": block.char_count() }))
    }
}
