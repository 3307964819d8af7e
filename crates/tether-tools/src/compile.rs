//! The compile step every tool goes through before it is stored
//!
//! A tool's source is a JSON document declaring its name, parameters and,
//! for imported tools, how to bind the external implementation. Compiling
//! checks the declaration and renders the document; the rendered text is
//! parsed back before it is accepted.

use crate::tool::{SourceType, Tool, ToolSource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tether_common::{Result, TetherError};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

/// The declarative source stored in `Tool::source_code`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub description: Option<String>,
    pub source_type: SourceType,
    pub module: Option<String>,
    pub parameters: Value,
    /// How an imported tool is constructed; empty for native tools
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub binding: Map<String, Value>,
}

/// Output of a successful compile
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTool {
    pub name: String,
    pub description: Option<String>,
    pub json_schema: Value,
    pub source_code: String,
    pub source_type: SourceType,
    pub module: Option<String>,
}

impl CompiledTool {
    /// An unpersisted tool record carrying this compiled source
    pub fn into_tool(self, tags: Vec<String>) -> Tool {
        let mut tool = Tool::new(self.name, self.source_type, self.source_code, self.json_schema);
        tool.description = self.description;
        tool.module = self.module;
        tool.tags = tags;
        tool
    }
}

/// Compile a tool source into its stored form
pub fn compile(source: &ToolSource) -> Result<CompiledTool> {
    let document = match source {
        ToolSource::Native(tool) => SourceDocument {
            name: tool.name().to_string(),
            description: non_empty(tool.description()),
            source_type: SourceType::Native,
            module: None,
            parameters: tool.schema(),
            binding: Map::new(),
        },
        ToolSource::External(tool) => SourceDocument {
            name: tool.name.clone(),
            description: non_empty(&tool.description),
            source_type: tool.source_type,
            module: Some(tool.module.clone()),
            parameters: tool.json_schema.clone(),
            binding: tool.binding(),
        },
    };

    check_name(&document.name)?;
    check_schema(&document.name, &document.parameters)?;

    let source_code = serde_json::to_string_pretty(&document)
        .map_err(|e| TetherError::Source(format!("cannot render '{}': {}", document.name, e)))?;
    let reparsed = parse_source(&source_code)?;
    if reparsed != document {
        return Err(TetherError::Source(format!(
            "source for '{}' does not round-trip",
            document.name
        )));
    }

    Ok(CompiledTool {
        name: document.name,
        description: document.description,
        json_schema: document.parameters,
        source_code,
        source_type: document.source_type,
        module: document.module,
    })
}

/// Check an already-translated tool record against its own source
pub fn verify(tool: &Tool) -> Result<()> {
    check_name(&tool.name)?;
    check_schema(&tool.name, &tool.json_schema)?;

    let document = parse_source(&tool.source_code)?;
    if document.name != tool.name {
        return Err(TetherError::Source(format!(
            "source declares '{}' but the tool is named '{}'",
            document.name, tool.name
        )));
    }
    if document.parameters != tool.json_schema {
        return Err(TetherError::Source(format!(
            "source parameters of '{}' differ from its schema",
            tool.name
        )));
    }
    if document.source_type != tool.source_type {
        return Err(TetherError::Source(format!(
            "source of '{}' is {}, record says {}",
            tool.name, document.source_type, tool.source_type
        )));
    }
    Ok(())
}

pub fn parse_source(source_code: &str) -> Result<SourceDocument> {
    serde_json::from_str(source_code)
        .map_err(|e| TetherError::Source(format!("source does not parse: {}", e)))
}

fn check_name(name: &str) -> Result<()> {
    if !IDENTIFIER.is_match(name) {
        return Err(TetherError::Source(format!(
            "'{}' is not a valid tool name",
            name
        )));
    }
    Ok(())
}

fn check_schema(name: &str, schema: &Value) -> Result<()> {
    let object = schema
        .as_object()
        .ok_or_else(|| TetherError::Source(format!("schema of '{}' is not an object", name)))?;

    if object.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Err(TetherError::Source(format!(
            "schema of '{}' must have type \"object\"",
            name
        )));
    }

    let empty = Map::new();
    let properties = match object.get("properties") {
        None => &empty,
        Some(Value::Object(props)) => props,
        Some(_) => {
            return Err(TetherError::Source(format!(
                "properties of '{}' must be an object",
                name
            )));
        }
    };

    let required = match object.get("required") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(_) => {
            return Err(TetherError::Source(format!(
                "required arguments of '{}' must be a list",
                name
            )));
        }
    };
    for arg in required {
        let arg = arg.as_str().ok_or_else(|| {
            TetherError::Source(format!("required arguments of '{}' must be strings", name))
        })?;
        if !properties.contains_key(arg) {
            return Err(TetherError::Source(format!(
                "'{}' requires undeclared argument '{}'",
                name, arg
            )));
        }
    }
    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
