//! Tool registry: persisted tool records plus the in-process callables bound to them

use crate::base::{AiTool, ToolContext};
use crate::compile::{compile, verify};
use crate::store::ToolStore;
use crate::tool::{Tool, ToolSource, ToolUpdate};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tether_common::{Result, TetherError};
use tether_memory::{Database, Owner};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Registry of tools for every user
pub struct ToolRegistry {
    store: ToolStore,
    /// Tool id → compiled callable
    runtime: RwLock<HashMap<String, Arc<dyn AiTool>>>,
}

impl ToolRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            store: ToolStore::new(db),
            runtime: RwLock::new(HashMap::new()),
        }
    }

    /// Compile and persist a native callable; the name comes from the callable.
    ///
    /// Fails with `Source` when it does not compile and with `NameConflict`
    /// when the owner already has a tool of that name.
    pub async fn create_tool(
        &self,
        owner: &Owner,
        func: Arc<dyn AiTool>,
        tags: Vec<String>,
    ) -> Result<Tool> {
        let compiled = compile(&ToolSource::Native(func.clone()))?;
        let tool = self
            .store
            .create(&compiled.into_tool(tags), owner)
            .await?;
        self.bind(&tool.id, func).await;

        info!("Created tool '{}' ({}) for {}", tool.name, tool.id, owner.user_id);
        Ok(tool)
    }

    /// Persist a translated tool, updating in place when the owner already has
    /// a tool of that name
    pub async fn add_tool(&self, owner: &Owner, tool: Tool) -> Result<Tool> {
        verify(&tool)?;

        match self.store.get_by_name(&tool.name, &owner.user_id).await? {
            Some(existing) => {
                let updated = self.store.replace(&existing.id, &tool, &owner.user_id).await?;
                self.unbind(&existing.id).await;
                debug!("Replaced tool '{}' ({}) in place", updated.name, updated.id);
                Ok(updated)
            }
            None => {
                let created = self.store.create(&tool, owner).await?;
                info!(
                    "Added {} tool '{}' ({})",
                    created.source_type, created.name, created.id
                );
                Ok(created)
            }
        }
    }

    /// Persist a native callable, or rebind it when the owner already has it
    pub async fn register_native(&self, owner: &Owner, func: Arc<dyn AiTool>) -> Result<Tool> {
        let compiled = compile(&ToolSource::Native(func.clone()))?;
        let tool = compiled.into_tool(Vec::new());

        let stored = match self.store.get_by_name(&tool.name, &owner.user_id).await? {
            Some(existing) if existing.source_code == tool.source_code => existing,
            Some(existing) => {
                let mut replacement = tool;
                replacement.tags = existing.tags.clone();
                self.store
                    .replace(&existing.id, &replacement, &owner.user_id)
                    .await?
            }
            None => self.store.create(&tool, owner).await?,
        };
        self.bind(&stored.id, func).await;
        Ok(stored)
    }

    /// Apply a partial update. A new callable re-derives name, schema and
    /// source; renaming into a name the owner already uses is a `NameConflict`.
    pub async fn update_tool(&self, id: &str, update: ToolUpdate, actor: &str) -> Result<Tool> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| TetherError::not_found("tool", id))?;
        if update.is_empty() {
            return Ok(current);
        }

        let Some(func) = update.func else {
            let updated = self
                .store
                .set_details(
                    id,
                    update.tags.as_deref(),
                    update.description.as_deref(),
                    actor,
                )
                .await?;
            debug!("Updated details of tool {} ('{}')", id, updated.name);
            return Ok(updated);
        };

        let compiled = compile(&ToolSource::Native(func.clone()))?;
        let owner_id = current.user_id.as_deref().unwrap_or_default();
        if compiled.name != current.name {
            if let Some(other) = self.store.get_by_name(&compiled.name, owner_id).await? {
                if other.id != current.id {
                    return Err(TetherError::name_conflict("tool", compiled.name));
                }
            }
        }

        let mut tool = current;
        tool.name = compiled.name;
        tool.description = compiled.description;
        tool.json_schema = compiled.json_schema;
        tool.source_code = compiled.source_code;
        tool.source_type = compiled.source_type;
        tool.module = compiled.module;
        if let Some(tags) = update.tags {
            tool.tags = tags;
        }
        if let Some(description) = update.description {
            tool.description = Some(description);
        }

        let updated = self.store.replace(id, &tool, actor).await?;
        self.bind(id, func).await;
        debug!("Updated tool {} ('{}')", id, updated.name);
        Ok(updated)
    }

    pub async fn get_tool(&self, id: &str) -> Result<Option<Tool>> {
        self.store.get(id).await
    }

    pub async fn get_tool_by_name(&self, name: &str, user_id: &str) -> Result<Option<Tool>> {
        self.store.get_by_name(name, user_id).await
    }

    pub async fn get_tool_id(&self, name: &str, user_id: &str) -> Result<Option<String>> {
        Ok(self.get_tool_by_name(name, user_id).await?.map(|t| t.id))
    }

    pub async fn list_tools(&self, user_id: &str) -> Result<Vec<Tool>> {
        self.store.list(user_id).await
    }

    /// Remove a tool; agents listing its name keep the name
    pub async fn delete_tool(&self, id: &str, actor: &str) -> Result<bool> {
        let deleted = self.store.delete(id, actor).await?;
        self.unbind(id).await;
        if deleted {
            info!("Deleted tool {}", id);
        }
        Ok(deleted)
    }

    /// True when an in-process callable is bound to the tool
    pub async fn is_bound(&self, id: &str) -> bool {
        self.runtime.read().await.contains_key(id)
    }

    /// Call a tool by name on behalf of `ctx`
    pub async fn run_tool(&self, ctx: &ToolContext, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .store
            .get_by_name(name, &ctx.user_id)
            .await?
            .ok_or_else(|| TetherError::not_found("tool", name))?;

        let callable = self
            .runtime
            .read()
            .await
            .get(&tool.id)
            .cloned()
            .ok_or_else(|| {
                TetherError::Tool(format!(
                    "{} tool '{}' has no in-process runtime",
                    tool.source_type, name
                ))
            })?;

        callable
            .validate_params(&args)
            .map_err(|e| TetherError::validation(format!("{}: {}", name, e)))?;

        debug!("Running tool '{}' for agent {}", name, ctx.agent_id);
        callable.execute(ctx, args).await.map_err(|e| {
            warn!("Tool '{}' failed: {}", name, e);
            TetherError::Tool(format!("{}: {}", name, e))
        })
    }

    async fn bind(&self, id: &str, func: Arc<dyn AiTool>) {
        self.runtime.write().await.insert(id.to_string(), func);
    }

    async fn unbind(&self, id: &str) {
        self.runtime.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FnTool;
    use crate::external::{ExternalToolDescription, ImportMapping};
    use serde_json::{Map, json};
    use std::collections::HashSet;

    async fn registry() -> ToolRegistry {
        ToolRegistry::new(Database::in_memory().await.unwrap())
    }

    fn owner() -> Owner {
        Owner::new("user-1", "org-1")
    }

    fn print_tool(name: &str, arg: &str) -> Arc<dyn AiTool> {
        let arg_name = arg.to_string();
        Arc::new(FnTool::new(
            name,
            "A tool to print a message",
            json!({
                "type": "object",
                "properties": { arg: { "type": "string" } },
                "required": [arg]
            }),
            move |_, params| Ok(params[arg_name.as_str()].clone()),
        ))
    }

    fn scrape_website() -> ExternalToolDescription {
        let mut init_args = Map::new();
        init_args.insert("website_url".to_string(), json!("https://www.example.com"));
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

    #[tokio::test]
    async fn test_create_update_and_rename() {
        let registry = registry().await;
        let tool = registry
            .create_tool(&owner(), print_tool("print_tool", "message"), vec!["extras".to_string()])
            .await
            .unwrap();

        assert_eq!(
            registry.get_tool_id("print_tool", "user-1").await.unwrap(),
            Some(tool.id.clone())
        );

        let tagged = registry
            .update_tool(&tool.id, ToolUpdate::tags(vec!["extras2".to_string()]), "user-1")
            .await
            .unwrap();
        assert_eq!(tagged.tags, vec!["extras2"]);
        assert_eq!(tagged.source_code, tool.source_code);
        assert!(registry.is_bound(&tool.id).await);

        registry
            .update_tool(&tool.id, ToolUpdate::func(print_tool("print_tool2", "msg")), "user-1")
            .await
            .unwrap();
        let renamed = registry.get_tool(&tool.id).await.unwrap().unwrap();
        assert_eq!(renamed.name, "print_tool2");
        assert_eq!(renamed.tags, vec!["extras2"]);
        assert!(renamed.json_schema["properties"].get("msg").is_some());
    }

    #[tokio::test]
    async fn test_create_and_rename_conflicts() {
        let registry = registry().await;
        registry
            .create_tool(&owner(), print_tool("print_tool", "message"), vec![])
            .await
            .unwrap();
        let err = registry
            .create_tool(&owner(), print_tool("print_tool", "message"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NameConflict { .. }));

        let other = registry
            .create_tool(&owner(), print_tool("other_tool", "message"), vec![])
            .await
            .unwrap();
        let err = registry
            .update_tool(&other.id, ToolUpdate::func(print_tool("print_tool", "m")), "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NameConflict { .. }));
        assert_eq!(
            registry.get_tool(&other.id).await.unwrap().unwrap().name,
            "other_tool"
        );
    }

    #[tokio::test]
    async fn test_invalid_source_is_not_persisted() {
        let registry = registry().await;
        let err = registry
            .create_tool(&owner(), print_tool("print tool", "message"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Source(_)));
        assert!(registry.list_tools("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_tool_upserts_by_name() {
        let registry = registry().await;
        let first = Tool::from_crewai(&scrape_website()).unwrap();
        let added = registry.add_tool(&owner(), first.clone()).await.unwrap();
        assert_eq!(added.id, first.id);

        let mut second = Tool::from_crewai(&scrape_website()).unwrap();
        second.tags = vec!["again".to_string()];
        let replaced = registry.add_tool(&owner(), second).await.unwrap();
        assert_eq!(replaced.id, first.id);
        assert_eq!(replaced.tags, vec!["again"]);

        let tools = registry.list_tools("user-1").await.unwrap();
        let pairs: HashSet<(String, Option<String>)> = tools
            .iter()
            .map(|t| (t.name.clone(), t.user_id.clone()))
            .collect();
        assert_eq!(pairs.len(), tools.len());
        assert_eq!(tools.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_import_mapping_persists_nothing() {
        let registry = registry().await;
        let desc = ExternalToolDescription {
            name: "wikipedia".to_string(),
            class_name: "WikipediaQueryRun".to_string(),
            module: "langchain_community.tools".to_string(),
            args_schema: json!({ "type": "object", "properties": {} }),
            requires: vec!["WikipediaAPIWrapper".to_string()],
            ..Default::default()
        };

        let err = Tool::from_langchain(&desc, &ImportMapping::new()).unwrap_err();
        assert!(matches!(err, TetherError::Import(_)));
        assert!(registry.list_tools("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_tool() {
        let registry = registry().await;
        registry
            .create_tool(&owner(), print_tool("print_tool", "message"), vec![])
            .await
            .unwrap();
        let ctx = ToolContext::new("agent-1", "user-1");

        let out = registry
            .run_tool(&ctx, "print_tool", json!({ "message": "hi" }))
            .await
            .unwrap();
        assert_eq!(out, json!("hi"));

        let err = registry
            .run_tool(&ctx, "print_tool", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Validation(_)));

        let err = registry
            .run_tool(&ctx, "nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_external_tools_have_no_runtime() {
        let registry = registry().await;
        let tool = registry
            .add_tool(&owner(), Tool::from_crewai(&scrape_website()).unwrap())
            .await
            .unwrap();
        assert!(!registry.is_bound(&tool.id).await);

        let ctx = ToolContext::new("agent-1", "user-1");
        let err = registry
            .run_tool(&ctx, &tool.name, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Tool(_)));
    }

    #[tokio::test]
    async fn test_tool_errors_are_wrapped() {
        let registry = registry().await;
        let failing: Arc<dyn AiTool> = Arc::new(FnTool::new(
            "fail",
            "Always fails",
            json!({ "type": "object" }),
            |_, _| Err(anyhow::anyhow!("boom")),
        ));
        registry.create_tool(&owner(), failing, vec![]).await.unwrap();

        let ctx = ToolContext::new("agent-1", "user-1");
        let err = registry.run_tool(&ctx, "fail", json!({})).await.unwrap_err();
        assert!(matches!(err, TetherError::Tool(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn test_register_native_is_idempotent_and_rebinds() {
        let db = Database::in_memory().await.unwrap();
        let registry = ToolRegistry::new(db.clone());
        let first = registry
            .register_native(&owner(), print_tool("print_tool", "message"))
            .await
            .unwrap();

        let fresh = ToolRegistry::new(db);
        assert!(!fresh.is_bound(&first.id).await);
        let again = fresh
            .register_native(&owner(), print_tool("print_tool", "message"))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert!(fresh.is_bound(&first.id).await);
    }

    #[tokio::test]
    async fn test_delete_tool_unbinds() {
        let registry = registry().await;
        let tool = registry
            .create_tool(&owner(), print_tool("print_tool", "message"), vec![])
            .await
            .unwrap();
        assert!(registry.delete_tool(&tool.id, "user-1").await.unwrap());
        assert!(!registry.delete_tool(&tool.id, "user-1").await.unwrap());
        assert!(!registry.is_bound(&tool.id).await);
        assert!(registry.get_tool(&tool.id).await.unwrap().is_none());
    }
}
