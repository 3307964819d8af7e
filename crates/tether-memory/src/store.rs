//! Block storage
//!
//! The [`BlockStore`] trait is the seam between memories and the database.
//! Every agent that references a block id reads and writes through it.

use crate::block::{Block, BlockRow};
use crate::db::{Database, Filter, tables};
use crate::types::{BlockId, Owner};
use async_trait::async_trait;
use serde_json::json;
use tether_common::{Result, TetherError};
use tracing::{debug, info};

/// A query for listing blocks
#[derive(Debug, Clone, Default)]
pub struct BlockQuery {
    pub user_id: Option<String>,
    pub label: Option<String>,
    /// Template name
    pub name: Option<String>,
    /// `Some(true)` for templates only, `Some(false)` for agent blocks only
    pub templates: Option<bool>,
}

impl BlockQuery {
    pub fn templates_for(user_id: impl Into<String>) -> Self {
        BlockQuery {
            user_id: Some(user_id.into()),
            templates: Some(true),
            ..Default::default()
        }
    }
}

/// Operations on persisted blocks
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist a new block owned by `owner`.
    ///
    /// Fails with `DuplicateKey` when the id exists, or when a template with
    /// the same label and name already exists for the owner.
    async fn create(&self, block: Block, owner: &Owner) -> Result<Block>;

    /// Retrieve a block by its ID; deleted blocks are `None`
    async fn get(&self, id: &BlockId) -> Result<Option<Block>>;

    /// True when the id is taken, including by a deleted block
    async fn id_taken(&self, id: &BlockId) -> Result<bool>;

    /// Replace a block's value in place
    async fn update(&self, id: &BlockId, value: &str, actor: &str) -> Result<Block>;

    /// Soft-delete a block; agents referencing it are left untouched
    async fn delete(&self, id: &BlockId, actor: &str) -> Result<bool>;

    /// List live blocks matching the query, oldest first
    async fn list(&self, query: BlockQuery) -> Result<Vec<Block>>;

    /// Look up a named template for a user
    async fn get_template(&self, label: &str, name: &str, user_id: &str) -> Result<Option<Block>> {
        let blocks = self
            .list(BlockQuery {
                user_id: Some(user_id.to_string()),
                label: Some(label.to_string()),
                name: Some(name.to_string()),
                templates: Some(true),
            })
            .await?;
        Ok(blocks.into_iter().next())
    }
}

/// SurrealDB-backed block store
#[derive(Clone)]
pub struct SurrealBlockStore {
    db: Database,
}

impl SurrealBlockStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlockStore for SurrealBlockStore {
    async fn create(&self, block: Block, owner: &Owner) -> Result<Block> {
        block.validate()?;

        if block.is_template {
            let name = block.name.as_deref().unwrap_or_default();
            if self
                .get_template(&block.label, name, &owner.user_id)
                .await?
                .is_some()
            {
                return Err(TetherError::duplicate_key(
                    "block template",
                    format!("{}/{}", block.label, name),
                ));
            }
        }

        let row = BlockRow::new(&block, owner, &owner.user_id)?;
        self.db
            .create(tables::BLOCKS, "block", &row.block_id, &row)
            .await?;

        info!("Stored block {} ({})", block.id, block.label);
        Ok(Block::from(row))
    }

    async fn get(&self, id: &BlockId) -> Result<Option<Block>> {
        let row: Option<BlockRow> = self.db.fetch(tables::BLOCKS, id.as_str()).await?;
        Ok(row.map(Block::from))
    }

    async fn id_taken(&self, id: &BlockId) -> Result<bool> {
        self.db.exists(tables::BLOCKS, id.as_str()).await
    }

    async fn update(&self, id: &BlockId, value: &str, actor: &str) -> Result<Block> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| TetherError::not_found("block", id.as_str()))?;
        current.check_value(value)?;

        let row: Option<BlockRow> = self
            .db
            .merge(
                tables::BLOCKS,
                id.as_str(),
                actor,
                json!({ "block_value": value }),
            )
            .await?;

        debug!("Updated block {} ({} chars)", id, value.chars().count());
        row.map(Block::from)
            .ok_or_else(|| TetherError::not_found("block", id.as_str()))
    }

    async fn delete(&self, id: &BlockId, actor: &str) -> Result<bool> {
        let deleted = self.db.soft_delete(tables::BLOCKS, id.as_str(), actor).await?;
        if deleted {
            info!("Deleted block {}", id);
        }
        Ok(deleted)
    }

    async fn list(&self, query: BlockQuery) -> Result<Vec<Block>> {
        let filter = Filter::new()
            .eq_opt("user_id", query.user_id)
            .eq_opt("label", query.label)
            .eq_opt("name", query.name)
            .eq_opt("is_template", query.templates)
            .order_by("audit.created_at");

        let rows: Vec<BlockRow> = self.db.select(tables::BLOCKS, filter).await?;
        Ok(rows.into_iter().map(Block::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockBuilder;

    async fn store() -> SurrealBlockStore {
        SurrealBlockStore::new(Database::in_memory().await.unwrap())
    }

    fn owner() -> Owner {
        Owner::new("user-1", "org-1")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store().await;
        let block = Block::human("Name: Ada");
        let id = block.id.clone();

        let created = store.create(block, &owner()).await.unwrap();
        assert_eq!(created.id, id);
        assert_eq!(created.user_id.as_deref(), Some("user-1"));

        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.value, "Name: Ada");
        assert!(store.get(&BlockId::new("block-missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_id_fails() {
        let store = store().await;
        let block = Block::human("Name: Ada");
        store.create(block.clone(), &owner()).await.unwrap();

        let err = store.create(block, &owner()).await.unwrap_err();
        assert!(matches!(err, TetherError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_template_label_and_name_are_unique_per_owner() {
        let store = store().await;
        let first = BlockBuilder::new("persona").template("sam").build().unwrap();
        let second = BlockBuilder::new("persona").template("sam").build().unwrap();
        let other_label = BlockBuilder::new("human").template("sam").build().unwrap();

        store.create(first, &owner()).await.unwrap();
        let err = store.create(second.clone(), &owner()).await.unwrap_err();
        assert!(matches!(err, TetherError::DuplicateKey { .. }));

        store.create(other_label, &owner()).await.unwrap();
        store
            .create(second, &Owner::new("user-2", "org-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_respects_limit() {
        let store = store().await;
        let block = BlockBuilder::new("human").with_limit(10).build().unwrap();
        let id = block.id.clone();
        store.create(block, &owner()).await.unwrap();

        let updated = store.update(&id, "short", "user-1").await.unwrap();
        assert_eq!(updated.value, "short");

        let err = store
            .update(&id, "much too long for this", "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Validation(_)));
        assert_eq!(store.get(&id).await.unwrap().unwrap().value, "short");
    }

    #[tokio::test]
    async fn test_update_missing_block() {
        let store = store().await;
        let err = store
            .update(&BlockId::new("block-nope"), "x", "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        let block = Block::persona("I am Sam");
        let id = block.id.clone();
        store.create(block, &owner()).await.unwrap();

        assert!(store.delete(&id, "user-1").await.unwrap());
        assert!(!store.delete(&id, "user-1").await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.id_taken(&id).await.unwrap());
        assert!(!store.id_taken(&BlockId::new("block-unused")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_templates() {
        let store = store().await;
        store
            .create(
                BlockBuilder::new("human").template("basic").build().unwrap(),
                &owner(),
            )
            .await
            .unwrap();
        store.create(Block::human("agent copy"), &owner()).await.unwrap();

        let templates = store
            .list(BlockQuery::templates_for("user-1"))
            .await
            .unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name.as_deref(), Some("basic"));

        let all = store
            .list(BlockQuery {
                user_id: Some("user-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let found = store
            .get_template("human", "basic", "user-1")
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
