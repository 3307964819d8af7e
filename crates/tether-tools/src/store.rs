//! Tool persistence

use crate::tool::{Tool, ToolRow};
use serde_json::{Value, json};
use tether_common::{Result, TetherError};
use tether_memory::db::{Database, Filter, tables};
use tether_memory::{AuditColumns, Owner};
use tracing::debug;

/// SurrealDB-backed tool table. Names are unique per owner.
#[derive(Clone)]
pub struct ToolStore {
    db: Database,
}

impl ToolStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a tool for `owner`; `NameConflict` when the owner already has that name
    pub async fn create(&self, tool: &Tool, owner: &Owner) -> Result<Tool> {
        if self.get_by_name(&tool.name, &owner.user_id).await?.is_some() {
            return Err(TetherError::name_conflict("tool", &tool.name));
        }

        let row = ToolRow {
            tool_id: tool.id.clone(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            tags: tool.tags.clone(),
            source_code: tool.source_code.clone(),
            source_type: tool.source_type.to_string(),
            json_schema: serde_json::to_string(&tool.json_schema)?,
            module: tool.module.clone(),
            user_id: owner.user_id.clone(),
            organization_id: owner.organization_id.clone(),
            audit: AuditColumns::created_by(&owner.user_id),
        };
        self.db.create(tables::TOOLS, "tool", &row.tool_id, &row).await?;
        Ok(Tool::from(row))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Tool>> {
        let row: Option<ToolRow> = self.db.fetch(tables::TOOLS, id).await?;
        Ok(row.map(Tool::from))
    }

    pub async fn get_by_name(&self, name: &str, user_id: &str) -> Result<Option<Tool>> {
        let rows: Vec<ToolRow> = self
            .db
            .select(
                tables::TOOLS,
                Filter::new().eq("user_id", user_id).eq("name", name),
            )
            .await?;
        Ok(rows.into_iter().next().map(Tool::from))
    }

    /// A user's tools, oldest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<Tool>> {
        let rows: Vec<ToolRow> = self
            .db
            .select(
                tables::TOOLS,
                Filter::new()
                    .eq("user_id", user_id)
                    .order_by("audit.created_at"),
            )
            .await?;
        Ok(rows.into_iter().map(Tool::from).collect())
    }

    /// Overwrite everything but the id and owner with the fields of `tool`
    pub async fn replace(&self, id: &str, tool: &Tool, actor: &str) -> Result<Tool> {
        let patch = json!({
            "name": tool.name,
            "description": tool.description,
            "tags": tool.tags,
            "source_code": tool.source_code,
            "source_type": tool.source_type.to_string(),
            "json_schema": serde_json::to_string(&tool.json_schema)?,
            "module": tool.module,
        });
        self.patch(id, patch, actor).await
    }

    /// Write tags and/or description in one update, leaving the source alone
    pub async fn set_details(
        &self,
        id: &str,
        tags: Option<&[String]>,
        description: Option<&str>,
        actor: &str,
    ) -> Result<Tool> {
        let mut patch = serde_json::Map::new();
        if let Some(tags) = tags {
            patch.insert("tags".to_string(), json!(tags));
        }
        if let Some(description) = description {
            patch.insert("description".to_string(), json!(description));
        }
        self.patch(id, Value::Object(patch), actor).await
    }

    async fn patch(&self, id: &str, patch: Value, actor: &str) -> Result<Tool> {
        let row: Option<ToolRow> = self.db.merge(tables::TOOLS, id, actor, patch).await?;
        debug!("Updated tool {}", id);
        row.map(Tool::from)
            .ok_or_else(|| TetherError::not_found("tool", id))
    }

    pub async fn delete(&self, id: &str, actor: &str) -> Result<bool> {
        self.db.soft_delete(tables::TOOLS, id, actor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::SourceType;

    async fn store() -> ToolStore {
        ToolStore::new(Database::in_memory().await.unwrap())
    }

    fn tool(name: &str) -> Tool {
        Tool::new(
            name,
            SourceType::Native,
            "{}",
            json!({ "type": "object", "properties": {} }),
        )
    }

    #[tokio::test]
    async fn test_create_get_and_list() {
        let store = store().await;
        let owner = Owner::new("user-1", "org-1");
        let created = store.create(&tool("alpha"), &owner).await.unwrap();
        store.create(&tool("beta"), &owner).await.unwrap();

        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "alpha");
        assert_eq!(fetched.json_schema["type"], "object");
        assert_eq!(fetched.user_id.as_deref(), Some("user-1"));

        let names: Vec<String> = store
            .list("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(store.list("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_names_are_unique_per_owner() {
        let store = store().await;
        store
            .create(&tool("alpha"), &Owner::new("user-1", "org-1"))
            .await
            .unwrap();

        let err = store
            .create(&tool("alpha"), &Owner::new("user-1", "org-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NameConflict { .. }));

        store
            .create(&tool("alpha"), &Owner::new("user-2", "org-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_details_and_delete() {
        let store = store().await;
        let created = store
            .create(&tool("alpha"), &Owner::new("user-1", "org-1"))
            .await
            .unwrap();

        let tags = vec!["extras2".to_string()];
        let updated = store
            .set_details(&created.id, Some(&tags), None, "user-1")
            .await
            .unwrap();
        assert_eq!(updated.tags, vec!["extras2"]);
        assert_eq!(updated.source_code, created.source_code);

        let described = store
            .set_details(&created.id, None, Some("prints things"), "user-1")
            .await
            .unwrap();
        assert_eq!(described.description.as_deref(), Some("prints things"));
        assert_eq!(described.tags, vec!["extras2"]);

        assert!(store.delete(&created.id, "user-1").await.unwrap());
        assert!(store.get(&created.id).await.unwrap().is_none());
        assert!(store.get_by_name("alpha", "user-1").await.unwrap().is_none());

        let err = store
            .set_details(&created.id, Some(&[]), None, "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }
}
