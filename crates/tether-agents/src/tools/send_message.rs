use anyhow::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tether_common::constants::base_tools;
use tether_tools::{AiTool, ToolContext};

use super::str_param;

/// Deliver a message to the user. The reply is recorded by the caller.
pub struct SendMessageTool;

#[async_trait]
impl AiTool for SendMessageTool {
    fn name(&self) -> &str {
        base_tools::SEND_MESSAGE
    }

    fn description(&self) -> &str {
        "Sends a message to the human user."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Message contents. All unicode (including emojis) are supported."
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, params: Value) -> Result<Value, Error> {
        let message = str_param(&params, "message")?;
        Ok(json!({ "status": "OK", "message": message }))
    }
}
