//! Memory block implementation
//!
//! A block is a labelled, length-limited string in an agent's core memory.
//! Blocks are persisted once and referenced by id afterwards.

use crate::types::{AuditColumns, BlockId, Owner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_common::constants::{CORE_MEMORY_BLOCK_CHAR_LIMIT, labels};
use tether_common::{Result, TetherError};

/// A core memory block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub label: String,
    pub value: String,
    /// Maximum value length, in characters
    pub limit: usize,
    pub is_template: bool,
    /// Template name; required when `is_template` is set
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// Create a block with a fresh id and the default limit
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        let now = Utc::now();
        Block {
            id: BlockId::generate(),
            label: label.into(),
            value: value.into(),
            limit: CORE_MEMORY_BLOCK_CHAR_LIMIT,
            is_template: false,
            name: None,
            description: None,
            metadata: Map::new(),
            user_id: None,
            organization_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn human(value: impl Into<String>) -> Self {
        Self::new(labels::HUMAN, value)
    }

    pub fn persona(value: impl Into<String>) -> Self {
        Self::new(labels::PERSONA, value)
    }

    /// Length of the value in characters
    pub fn char_count(&self) -> usize {
        self.value.chars().count()
    }

    /// Check that `value` would fit in this block
    pub fn check_value(&self, value: &str) -> Result<()> {
        let len = value.chars().count();
        if len > self.limit {
            return Err(TetherError::validation(format!(
                "value for block '{}' is {} characters, limit is {}",
                self.label, len, self.limit
            )));
        }
        Ok(())
    }

    /// Check the block's own invariants
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(TetherError::validation("block label must not be empty"));
        }
        if self.is_template && self.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
            return Err(TetherError::validation(format!(
                "template block '{}' requires a name",
                self.label
            )));
        }
        self.check_value(&self.value)
    }

    /// Copy of this block under a new id, for instantiating a template
    pub fn instantiate(&self) -> Block {
        let now = Utc::now();
        Block {
            id: BlockId::generate(),
            is_template: false,
            name: None,
            user_id: None,
            organization_id: None,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Builder for creating blocks
pub struct BlockBuilder {
    id: Option<BlockId>,
    label: String,
    value: String,
    limit: usize,
    template_name: Option<String>,
    description: Option<String>,
    metadata: Map<String, Value>,
}

impl BlockBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        BlockBuilder {
            id: None,
            label: label.into(),
            value: String::new(),
            limit: CORE_MEMORY_BLOCK_CHAR_LIMIT,
            template_name: None,
            description: None,
            metadata: Map::new(),
        }
    }

    /// Set a custom ID (otherwise one will be generated)
    pub fn with_id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Mark the block as a named template
    pub fn template(mut self, name: impl Into<String>) -> Self {
        self.template_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build and validate the block
    pub fn build(self) -> Result<Block> {
        let mut block = Block::new(self.label, self.value);
        if let Some(id) = self.id {
            block.id = id;
        }
        block.limit = self.limit;
        block.is_template = self.template_name.is_some();
        block.name = self.template_name;
        block.description = self.description;
        block.metadata = self.metadata;
        block.validate()?;
        Ok(block)
    }
}

/// Persisted form of a block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BlockRow {
    pub block_id: String,
    pub label: String,
    pub block_value: String,
    pub char_limit: usize,
    pub is_template: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    /// JSON-encoded metadata object
    pub metadata: String,
    pub user_id: String,
    pub organization_id: String,
    pub audit: AuditColumns,
}

impl BlockRow {
    pub fn new(block: &Block, owner: &Owner, actor: &str) -> Result<Self> {
        Ok(BlockRow {
            block_id: block.id.to_string(),
            label: block.label.clone(),
            block_value: block.value.clone(),
            char_limit: block.limit,
            is_template: block.is_template,
            name: block.name.clone(),
            description: block.description.clone(),
            metadata: serde_json::to_string(&block.metadata)?,
            user_id: owner.user_id.clone(),
            organization_id: owner.organization_id.clone(),
            audit: AuditColumns::created_at(actor, block.created_at),
        })
    }
}

impl From<BlockRow> for Block {
    fn from(row: BlockRow) -> Self {
        let metadata = serde_json::from_str(&row.metadata).unwrap_or_default();
        Block {
            id: BlockId::new(row.block_id),
            label: row.label,
            value: row.block_value,
            limit: row.char_limit,
            is_template: row.is_template,
            name: row.name,
            description: row.description,
            metadata,
            user_id: Some(row.user_id),
            organization_id: Some(row.organization_id),
            created_at: row.audit.created(),
            updated_at: row.audit.updated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_builder() {
        let block = BlockBuilder::new("human")
            .with_value("Name: Ada")
            .with_limit(100)
            .with_description("facts about the user")
            .with_metadata("source", "test")
            .build()
            .unwrap();

        assert_eq!(block.label, "human");
        assert_eq!(block.value, "Name: Ada");
        assert_eq!(block.limit, 100);
        assert!(!block.is_template);
        assert_eq!(block.metadata.get("source").and_then(|v| v.as_str()), Some("test"));
    }

    #[test]
    fn test_builder_rejects_oversized_value() {
        let result = BlockBuilder::new("human")
            .with_value("x".repeat(11))
            .with_limit(10)
            .build();
        assert!(matches!(result, Err(TetherError::Validation(_))));
    }

    #[test]
    fn test_builder_rejects_empty_label() {
        assert!(BlockBuilder::new("  ").build().is_err());
    }

    #[test]
    fn test_limit_counts_characters_not_bytes() {
        let block = BlockBuilder::new("persona")
            .with_value("héllo")
            .with_limit(5)
            .build()
            .unwrap();
        assert_eq!(block.char_count(), 5);
    }

    #[test]
    fn test_template_requires_name() {
        let mut block = Block::human("Name: Ada");
        block.is_template = true;
        assert!(block.validate().is_err());

        let template = BlockBuilder::new("human").template("ada").build().unwrap();
        assert!(template.is_template);
        assert_eq!(template.name.as_deref(), Some("ada"));
    }

    #[test]
    fn test_instantiate_gets_new_id() {
        let template = BlockBuilder::new("persona")
            .with_value("I am Sam")
            .template("sam")
            .build()
            .unwrap();
        let copy = template.instantiate();

        assert_ne!(copy.id, template.id);
        assert_eq!(copy.value, template.value);
        assert!(!copy.is_template);
        assert!(copy.name.is_none());
    }

    #[test]
    fn test_row_conversion_keeps_fields() {
        let block = BlockBuilder::new("human")
            .with_value("Name: Ada")
            .with_metadata("k", 1)
            .build()
            .unwrap();
        let owner = Owner::new("user-1", "org-1");
        let row = BlockRow::new(&block, &owner, "user-1").unwrap();
        let restored = Block::from(row);

        assert_eq!(restored.id, block.id);
        assert_eq!(restored.value, block.value);
        assert_eq!(restored.metadata, block.metadata);
        assert_eq!(restored.user_id.as_deref(), Some("user-1"));
    }
}
