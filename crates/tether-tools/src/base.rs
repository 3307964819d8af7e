//! The callable side of a tool

use anyhow::{Error, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Who a tool call is made on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub agent_id: String,
    pub user_id: String,
}

impl ToolContext {
    pub fn new(agent_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A tool that can be called by an agent
#[async_trait]
pub trait AiTool: Send + Sync {
    /// The name of the tool
    fn name(&self) -> &str;

    /// A description of what the tool does
    fn description(&self) -> &str;

    /// The JSON schema for the tool's parameters
    fn schema(&self) -> Value;

    /// Execute the tool with the given parameters
    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value, Error>;

    /// Check that params is an object carrying every required argument
    fn validate_params(&self, params: &Value) -> Result<(), Error> {
        let object = params
            .as_object()
            .ok_or_else(|| anyhow!("Parameters must be an object"))?;

        let schema = self.schema();
        let required = schema
            .get("required")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        for arg in required.iter().filter_map(|r| r.as_str()) {
            if !object.contains_key(arg) {
                return Err(anyhow!("Missing '{}' parameter", arg));
            }
        }
        Ok(())
    }
}

type ToolFn = dyn Fn(&ToolContext, Value) -> Result<Value, Error> + Send + Sync;

/// A tool built from a plain function
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    func: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        func: F,
    ) -> Self
    where
        F: Fn(&ToolContext, Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AiTool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value, Error> {
        self.validate_params(&params)?;
        (self.func)(ctx, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl AiTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the input text"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to echo back"
                    }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, _ctx: &ToolContext, params: Value) -> Result<Value, Error> {
            self.validate_params(&params)?;
            Ok(params["text"].clone())
        }
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let ctx = ToolContext::new("agent-1", "user-1");
        let result = EchoTool
            .execute(&ctx, json!({"text": "Hello, world!"}))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "Hello, world!");
    }

    #[tokio::test]
    async fn test_missing_required_param() {
        let ctx = ToolContext::new("agent-1", "user-1");
        assert!(EchoTool.execute(&ctx, json!({})).await.is_err());
        assert!(EchoTool.execute(&ctx, json!("text")).await.is_err());
    }

    #[tokio::test]
    async fn test_fn_tool() {
        let tool = FnTool::new(
            "print_tool",
            "A tool to print a message",
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            }),
            |ctx, params| Ok(json!(format!("{}: {}", ctx.agent_id, params["message"].as_str().unwrap_or_default()))),
        );

        let ctx = ToolContext::new("agent-1", "user-1");
        let result = tool.execute(&ctx, json!({"message": "hi"})).await.unwrap();
        assert_eq!(result, json!("agent-1: hi"));
    }
}
