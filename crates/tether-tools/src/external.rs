//! Adapters for tools from other agent-tooling ecosystems
//!
//! The caller introspects the external tool and hands over an
//! [`ExternalToolDescription`]. The adapters check that everything needed to
//! rebuild the tool later is present, then translate it into an unpersisted
//! [`Tool`]. Nothing is written until the tool is added to a registry.

use crate::compile::compile;
use crate::tool::{SourceType, Tool, ToolSource};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tether_common::{Result, TetherError};
use tracing::debug;

/// An external tool as introspected from its ecosystem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalToolDescription {
    /// Name as the ecosystem reports it, e.g. "Read website content"
    pub name: String,
    pub class_name: String,
    pub module: String,
    pub description: String,
    pub args_schema: Value,
    /// Constructor arguments fixed when the tool was built
    pub init_args: Map<String, Value>,
    /// Attribute names of objects the constructor needs, which must be importable
    pub requires: Vec<String>,
}

/// Module → attribute map for the imports an external tool needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportMapping(BTreeMap<String, String>);

impl ImportMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: impl Into<String>, attr: impl Into<String>) -> Self {
        self.0.insert(module.into(), attr.into());
        self
    }

    /// Module providing `attr`, if mapped
    pub fn module_for(&self, attr: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, a)| a.as_str() == attr)
            .map(|(module, _)| module.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A translated external tool, ready to compile
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTool {
    pub name: String,
    pub description: String,
    pub json_schema: Value,
    pub source_type: SourceType,
    pub module: String,
    pub class_name: String,
    pub init_args: Map<String, Value>,
    pub imports: BTreeMap<String, String>,
    /// Composio action name
    pub action: Option<String>,
}

impl ExternalTool {
    /// Translate a LangChain tool. Every constructor dependency must be mapped
    /// to its module.
    pub fn langchain(desc: &ExternalToolDescription, mapping: &ImportMapping) -> Result<Self> {
        let imports = resolve_imports(SourceType::Langchain, desc, mapping)?;
        Ok(Self::translate(SourceType::Langchain, desc, imports, None))
    }

    /// Translate a CrewAI tool. Arguments fixed at construction are no longer required.
    pub fn crewai(desc: &ExternalToolDescription) -> Result<Self> {
        let imports = resolve_imports(SourceType::Crewai, desc, &ImportMapping::new())?;
        let mut tool = Self::translate(SourceType::Crewai, desc, imports, None);

        if let Some(Value::Array(required)) = tool.json_schema.get_mut("required") {
            required.retain(|arg| {
                arg.as_str()
                    .is_none_or(|name| !desc.init_args.contains_key(name))
            });
        }
        Ok(tool)
    }

    /// Translate a Composio action
    pub fn composio(action: &str, desc: &ExternalToolDescription) -> Result<Self> {
        let action = action.trim();
        if action.is_empty() {
            return Err(TetherError::Import(
                "composio tool requires an action name".to_string(),
            ));
        }
        let imports = resolve_imports(SourceType::Composio, desc, &ImportMapping::new())?;
        let mut tool = Self::translate(SourceType::Composio, desc, imports, Some(action.to_string()));
        tool.name = snake_case(action);
        Ok(tool)
    }

    fn translate(
        source_type: SourceType,
        desc: &ExternalToolDescription,
        imports: BTreeMap<String, String>,
        action: Option<String>,
    ) -> Self {
        ExternalTool {
            name: snake_case(&desc.name),
            description: desc.description.clone(),
            json_schema: desc.args_schema.clone(),
            source_type,
            module: desc.module.clone(),
            class_name: desc.class_name.clone(),
            init_args: desc.init_args.clone(),
            imports,
            action,
        }
    }

    /// How to rebuild the external implementation, as stored in the source document
    pub(crate) fn binding(&self) -> Map<String, Value> {
        let mut binding = Map::new();
        binding.insert("class".to_string(), json!(self.class_name));
        if !self.init_args.is_empty() {
            binding.insert("init_args".to_string(), Value::Object(self.init_args.clone()));
        }
        if !self.imports.is_empty() {
            binding.insert("imports".to_string(), json!(self.imports));
        }
        if let Some(action) = &self.action {
            binding.insert("action".to_string(), json!(action));
        }
        binding
    }
}

impl Tool {
    /// Translate a LangChain tool into an unpersisted tool record
    pub fn from_langchain(desc: &ExternalToolDescription, mapping: &ImportMapping) -> Result<Tool> {
        let external = ExternalTool::langchain(desc, mapping)?;
        Self::from_external(external, "langchain")
    }

    /// Translate a CrewAI tool into an unpersisted tool record
    pub fn from_crewai(desc: &ExternalToolDescription) -> Result<Tool> {
        let external = ExternalTool::crewai(desc)?;
        Self::from_external(external, "crew-ai")
    }

    /// Translate a Composio action into an unpersisted tool record
    pub fn from_composio(action: &str, desc: &ExternalToolDescription) -> Result<Tool> {
        let external = ExternalTool::composio(action, desc)?;
        Self::from_external(external, "composio")
    }

    fn from_external(external: ExternalTool, tag: &str) -> Result<Tool> {
        let compiled = compile(&ToolSource::External(external))?;
        debug!("Translated {} tool '{}'", compiled.source_type, compiled.name);
        Ok(compiled.into_tool(vec![tag.to_string()]))
    }
}

fn resolve_imports(
    source_type: SourceType,
    desc: &ExternalToolDescription,
    mapping: &ImportMapping,
) -> Result<BTreeMap<String, String>> {
    if desc.class_name.trim().is_empty() || desc.module.trim().is_empty() {
        return Err(TetherError::Import(format!(
            "{} tool '{}' is missing its class or module",
            source_type, desc.name
        )));
    }

    let mut imports = BTreeMap::new();
    for attr in &desc.requires {
        let module = mapping.module_for(attr).ok_or_else(|| {
            TetherError::Import(format!(
                "{} tool '{}' needs '{}' but no module maps to it",
                source_type, desc.name, attr
            ))
        })?;
        imports.insert(module.to_string(), attr.clone());
    }
    Ok(imports)
}

/// "Read website content" → "read_website_content"
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::parse_source;

    fn wikipedia() -> ExternalToolDescription {
        ExternalToolDescription {
            name: "wikipedia".to_string(),
            class_name: "WikipediaQueryRun".to_string(),
            module: "langchain_community.tools".to_string(),
            description: "Look up a topic on Wikipedia".to_string(),
            args_schema: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
            init_args: Map::new(),
            requires: vec!["WikipediaAPIWrapper".to_string()],
        }
    }

    fn scrape_website(url: Option<&str>) -> ExternalToolDescription {
        let mut init_args = Map::new();
        if let Some(url) = url {
            init_args.insert("website_url".to_string(), json!(url));
        }
        ExternalToolDescription {
            name: "Read website content".to_string(),
            class_name: "ScrapeWebsiteTool".to_string(),
            module: "crewai_tools".to_string(),
            description: "Read a website's content".to_string(),
            args_schema: json!({
                "type": "object",
                "properties": { "website_url": { "type": "string" } },
                "required": ["website_url"]
            }),
            init_args,
            requires: vec![],
        }
    }

    #[test]
    fn test_langchain_with_mapping() {
        let mapping =
            ImportMapping::new().with("langchain_community.utilities", "WikipediaAPIWrapper");
        let tool = Tool::from_langchain(&wikipedia(), &mapping).unwrap();

        assert_eq!(tool.name, "wikipedia");
        assert_eq!(tool.source_type, SourceType::Langchain);
        assert_eq!(tool.tags, vec!["langchain"]);

        let document = parse_source(&tool.source_code).unwrap();
        assert_eq!(document.binding["class"], "WikipediaQueryRun");
        assert_eq!(
            document.binding["imports"]["langchain_community.utilities"],
            "WikipediaAPIWrapper"
        );
    }

    #[test]
    fn test_langchain_missing_imports_fails_fast() {
        let err = Tool::from_langchain(&wikipedia(), &ImportMapping::new()).unwrap_err();
        assert!(matches!(err, TetherError::Import(_)));
        assert!(err.to_string().contains("WikipediaAPIWrapper"));
    }

    #[test]
    fn test_crewai_name_and_fixed_args() {
        let tool = Tool::from_crewai(&scrape_website(None)).unwrap();
        assert_eq!(tool.name, "read_website_content");
        assert_eq!(tool.json_schema["required"], json!(["website_url"]));

        let tool = Tool::from_crewai(&scrape_website(Some("https://www.example.com"))).unwrap();
        assert_eq!(tool.json_schema["required"], json!([]));
        let document = parse_source(&tool.source_code).unwrap();
        assert_eq!(
            document.binding["init_args"]["website_url"],
            "https://www.example.com"
        );
    }

    #[test]
    fn test_composio_requires_action() {
        let desc = ExternalToolDescription {
            name: "github".to_string(),
            class_name: "ComposioToolSet".to_string(),
            module: "composio_langchain".to_string(),
            args_schema: json!({ "type": "object", "properties": {} }),
            ..Default::default()
        };

        let err = Tool::from_composio("  ", &desc).unwrap_err();
        assert!(matches!(err, TetherError::Import(_)));

        let tool = Tool::from_composio(
            "GITHUB_STAR_A_REPOSITORY_FOR_THE_AUTHENTICATED_USER",
            &desc,
        )
        .unwrap();
        assert_eq!(
            tool.name,
            "github_star_a_repository_for_the_authenticated_user"
        );
    }

    #[test]
    fn test_missing_class_is_an_import_error() {
        let mut desc = scrape_website(None);
        desc.class_name.clear();
        assert!(matches!(
            Tool::from_crewai(&desc),
            Err(TetherError::Import(_))
        ));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Read website content"), "read_website_content");
        assert_eq!(snake_case("  Search -- the web! "), "search_the_web");
    }
}
