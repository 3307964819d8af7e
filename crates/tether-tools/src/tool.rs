//! Tool records

use crate::base::AiTool;
use crate::external::ExternalTool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tether_common::{Result, TetherError, generate_id};
use tether_memory::AuditColumns;

/// Where a tool's source came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Native,
    Langchain,
    Crewai,
    Composio,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Native => "native",
            SourceType::Langchain => "langchain",
            SourceType::Crewai => "crewai",
            SourceType::Composio => "composio",
        }
    }
}

impl FromStr for SourceType {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(SourceType::Native),
            "langchain" => Ok(SourceType::Langchain),
            "crewai" => Ok(SourceType::Crewai),
            "composio" => Ok(SourceType::Composio),
            other => Err(TetherError::validation(format!(
                "unknown tool source type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool before compilation: an in-process callable or an imported description
#[derive(Clone)]
pub enum ToolSource {
    Native(Arc<dyn AiTool>),
    External(ExternalTool),
}

impl fmt::Debug for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSource::Native(tool) => f.debug_tuple("Native").field(&tool.name()).finish(),
            ToolSource::External(tool) => f.debug_tuple("External").field(tool).finish(),
        }
    }
}

/// A registered tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Declarative source: a JSON document describing the callable
    pub source_code: String,
    pub source_type: SourceType,
    pub json_schema: Value,
    pub module: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// An unpersisted tool with a fresh id
    pub fn new(
        name: impl Into<String>,
        source_type: SourceType,
        source_code: impl Into<String>,
        json_schema: Value,
    ) -> Self {
        let now = Utc::now();
        Tool {
            id: generate_id("tool"),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            source_code: source_code.into(),
            source_type,
            json_schema,
            module: None,
            user_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields of a tool that may be changed after creation
#[derive(Clone, Default)]
pub struct ToolUpdate {
    /// New callable; re-derives the name, schema and source
    pub func: Option<Arc<dyn AiTool>>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
}

impl ToolUpdate {
    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Default::default()
        }
    }

    pub fn func(func: Arc<dyn AiTool>) -> Self {
        Self {
            func: Some(func),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.func.is_none() && self.tags.is_none() && self.description.is_none()
    }
}

/// Persisted form of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ToolRow {
    pub tool_id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub source_code: String,
    pub source_type: String,
    /// JSON-encoded schema
    pub json_schema: String,
    pub module: Option<String>,
    pub user_id: String,
    pub organization_id: String,
    pub audit: AuditColumns,
}

impl From<ToolRow> for Tool {
    fn from(row: ToolRow) -> Self {
        let json_schema = serde_json::from_str(&row.json_schema).unwrap_or(Value::Null);
        Tool {
            id: row.tool_id,
            name: row.name,
            description: row.description,
            tags: row.tags,
            source_code: row.source_code,
            source_type: row.source_type.parse().unwrap_or(SourceType::Native),
            json_schema,
            module: row.module,
            user_id: Some(row.user_id),
            created_at: row.audit.created(),
            updated_at: row.audit.updated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(SourceType::Crewai).unwrap(),
            json!("crewai")
        );
        assert_eq!(SourceType::Langchain.to_string(), "langchain");
        assert_eq!("composio".parse::<SourceType>().unwrap(), SourceType::Composio);
        assert!("python".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_new_tool_has_fresh_id() {
        let a = Tool::new("a", SourceType::Native, "{}", json!({}));
        let b = Tool::new("a", SourceType::Native, "{}", json!({}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("tool-"));
    }

    #[test]
    fn test_update_is_empty() {
        assert!(ToolUpdate::default().is_empty());
        assert!(!ToolUpdate::tags(vec!["x".to_string()]).is_empty());
    }
}
