//! In-context (core) memory
//!
//! A [`Memory`] maps labels to block ids and reads every value through the
//! block store, so two memories holding the same id always agree.

use crate::block::Block;
use crate::store::BlockStore;
use crate::types::{BlockId, Owner};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tether_common::constants::CORE_MEMORY_BLOCK_CHAR_LIMIT;
use tether_common::{Result, TetherError};
use tracing::{debug, warn};

/// Blocks given by value, before they are persisted.
///
/// A block whose id already exists in the store is referenced, not copied.
#[derive(Debug, Clone, Default)]
pub struct BlockMemory {
    blocks: Vec<Block>,
}

impl BlockMemory {
    /// Basic block memory over arbitrary labels
    pub fn new(blocks: Vec<Block>) -> Result<Self> {
        let mut seen = HashSet::new();
        for block in &blocks {
            if !seen.insert(block.label.as_str()) {
                return Err(TetherError::validation(format!(
                    "duplicate block label '{}' in memory",
                    block.label
                )));
            }
        }
        Ok(Self { blocks })
    }

    /// Chat memory: a `human` and a `persona` block
    pub fn chat(human: impl Into<String>, persona: impl Into<String>) -> Result<Self> {
        Self::chat_with_limit(human, persona, CORE_MEMORY_BLOCK_CHAR_LIMIT)
    }

    pub fn chat_with_limit(
        human: impl Into<String>,
        persona: impl Into<String>,
        limit: usize,
    ) -> Result<Self> {
        let mut human = Block::human(human);
        let mut persona = Block::persona(persona);
        human.limit = limit;
        persona.limit = limit;
        human.validate()?;
        persona.validate()?;
        Self::new(vec![human, persona])
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

/// Labelled references to persisted blocks
#[derive(Clone)]
pub struct Memory {
    store: Arc<dyn BlockStore>,
    blocks: BTreeMap<String, BlockId>,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("blocks", &self.blocks)
            .finish()
    }
}

impl Memory {
    /// Rebuild a memory from stored label → id references
    pub fn from_refs(store: Arc<dyn BlockStore>, blocks: BTreeMap<String, BlockId>) -> Self {
        Self { store, blocks }
    }

    /// Persist or reference every block of `layout`.
    ///
    /// Blocks whose id already exists resolve to the stored block, and the
    /// stored value wins. Existing blocks must belong to `owner`. The remaining
    /// blocks are created for `owner`. All checks run before the first write.
    pub async fn resolve(
        store: Arc<dyn BlockStore>,
        layout: BlockMemory,
        owner: &Owner,
    ) -> Result<Self> {
        let mut refs = BTreeMap::new();
        let mut to_create = Vec::new();
        let mut new_ids = HashSet::new();
        let mut new_templates = HashSet::new();

        for block in layout.into_blocks() {
            match store.get(&block.id).await? {
                Some(existing) => {
                    if existing.user_id.as_deref() != Some(owner.user_id.as_str()) {
                        return Err(TetherError::validation(format!(
                            "block {} does not belong to user {}",
                            block.id, owner.user_id
                        )));
                    }
                    if existing.label != block.label {
                        return Err(TetherError::validation(format!(
                            "block {} has label '{}', not '{}'",
                            block.id, existing.label, block.label
                        )));
                    }
                    debug!("Referencing existing block {} as '{}'", block.id, block.label);
                    refs.insert(block.label, existing.id);
                }
                None => {
                    block.validate()?;
                    if !new_ids.insert(block.id.clone()) || store.id_taken(&block.id).await? {
                        return Err(TetherError::duplicate_key("block", block.id.as_str()));
                    }
                    if block.is_template {
                        let name = block.name.clone().unwrap_or_default();
                        let taken = !new_templates.insert((block.label.clone(), name.clone()))
                            || store
                                .get_template(&block.label, &name, &owner.user_id)
                                .await?
                                .is_some();
                        if taken {
                            return Err(TetherError::duplicate_key(
                                "block template",
                                format!("{}/{}", block.label, name),
                            ));
                        }
                    }
                    refs.insert(block.label.clone(), block.id.clone());
                    to_create.push(block);
                }
            }
        }

        for block in to_create {
            store.create(block, owner).await?;
        }

        Ok(Self::from_refs(store, refs))
    }

    /// Labels in this memory, sorted
    pub fn labels(&self) -> Vec<String> {
        self.blocks.keys().cloned().collect()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.values().cloned().collect()
    }

    pub fn block_id(&self, label: &str) -> Option<&BlockId> {
        self.blocks.get(label)
    }

    /// The label → id mapping, as persisted with an agent
    pub fn refs(&self) -> &BTreeMap<String, BlockId> {
        &self.blocks
    }

    /// Current persisted block for `label`
    pub async fn get_block(&self, label: &str) -> Result<Option<Block>> {
        match self.blocks.get(label) {
            Some(id) => self.store.get(id).await,
            None => Ok(None),
        }
    }

    /// Write a new value to the block behind `label`
    pub async fn update_block_value(&self, label: &str, value: &str, actor: &str) -> Result<Block> {
        let id = self
            .blocks
            .get(label)
            .ok_or_else(|| TetherError::not_found("memory block", label))?;
        self.store.update(id, value, actor).await
    }

    /// All current blocks, keyed by label; deleted blocks are skipped
    pub async fn blocks(&self) -> Result<BTreeMap<String, Block>> {
        let mut blocks = BTreeMap::new();
        for (label, id) in &self.blocks {
            match self.store.get(id).await? {
                Some(block) => {
                    blocks.insert(label.clone(), block);
                }
                None => warn!("Memory block {} ('{}') no longer exists", id, label),
            }
        }
        Ok(blocks)
    }

    /// Label → `{id, value, limit, metadata}` from the current persisted values
    pub async fn to_dict(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .blocks()
            .await?
            .into_iter()
            .map(|(label, block)| {
                let entry = json!({
                    "id": block.id,
                    "value": block.value,
                    "limit": block.limit,
                    "metadata": block.metadata,
                });
                (label, entry)
            })
            .collect())
    }

    /// Render the blocks into the prompt section of the system message
    pub async fn compile(&self) -> Result<String> {
        let sections: Vec<String> = self
            .blocks()
            .await?
            .into_iter()
            .map(|(label, block)| {
                format!(
                    "<{label} characters=\"{}/{}\">\n{}\n</{label}>",
                    block.char_count(),
                    block.limit,
                    block.value
                )
            })
            .collect();
        Ok(sections.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockBuilder;
    use crate::db::Database;
    use crate::store::SurrealBlockStore;

    async fn store() -> Arc<dyn BlockStore> {
        Arc::new(SurrealBlockStore::new(Database::in_memory().await.unwrap()))
    }

    fn owner() -> Owner {
        Owner::new("user-1", "org-1")
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let result = BlockMemory::new(vec![Block::human("a"), Block::human("b")]);
        assert!(matches!(result, Err(TetherError::Validation(_))));
    }

    #[test]
    fn test_chat_memory_checks_limit() {
        assert!(BlockMemory::chat_with_limit("x".repeat(20), "ok", 10).is_err());
        let layout = BlockMemory::chat("human text", "persona text").unwrap();
        assert_eq!(layout.blocks().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_creates_new_blocks() {
        let store = store().await;
        let layout = BlockMemory::chat("Name: Ada", "I am Sam").unwrap();
        let memory = Memory::resolve(store.clone(), layout, &owner()).await.unwrap();

        assert_eq!(memory.labels(), vec!["human", "persona"]);
        let human = memory.get_block("human").await.unwrap().unwrap();
        assert_eq!(human.value, "Name: Ada");
        assert!(memory.get_block("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shared_block_updates_are_visible_through_both_memories() {
        let store = store().await;
        let shared = Block::human("Name: Ada");

        let first = Memory::resolve(
            store.clone(),
            BlockMemory::new(vec![shared.clone(), Block::persona("one")]).unwrap(),
            &owner(),
        )
        .await
        .unwrap();
        let second = Memory::resolve(
            store.clone(),
            BlockMemory::new(vec![shared.clone(), Block::persona("two")]).unwrap(),
            &owner(),
        )
        .await
        .unwrap();

        assert_eq!(first.block_id("human"), second.block_id("human"));

        first
            .update_block_value("human", "Name: Grace", "user-1")
            .await
            .unwrap();
        let seen = second.get_block("human").await.unwrap().unwrap();
        assert_eq!(seen.value, "Name: Grace");
    }

    #[tokio::test]
    async fn test_stored_value_wins_over_passed_value() {
        let store = store().await;
        let block = Block::human("stored");
        store.create(block.clone(), &owner()).await.unwrap();

        let mut stale = block.clone();
        stale.value = "passed in".to_string();
        let memory = Memory::resolve(store, BlockMemory::new(vec![stale]).unwrap(), &owner())
            .await
            .unwrap();

        let human = memory.get_block("human").await.unwrap().unwrap();
        assert_eq!(human.value, "stored");
    }

    #[tokio::test]
    async fn test_resolve_rejects_label_mismatch_before_writing() {
        let store = store().await;
        let block = Block::human("stored");
        store.create(block.clone(), &owner()).await.unwrap();

        let mut relabelled = block.clone();
        relabelled.label = "persona".to_string();
        let fresh = Block::new("notes", "new");
        let fresh_id = fresh.id.clone();

        let result = Memory::resolve(
            store.clone(),
            BlockMemory::new(vec![fresh, relabelled]).unwrap(),
            &owner(),
        )
        .await;
        assert!(result.is_err());
        assert!(store.get(&fresh_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_rejects_shared_new_id_without_writing() {
        let store = store().await;
        let human = Block::human("fresh human");
        let mut persona = Block::persona("fresh persona");
        persona.id = human.id.clone();
        let id = human.id.clone();

        let err = Memory::resolve(
            store.clone(),
            BlockMemory::new(vec![human, persona]).unwrap(),
            &owner(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TetherError::DuplicateKey { .. }));
        assert!(!store.id_taken(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_rejects_taken_template_without_writing() {
        let store = store().await;
        let template = BlockBuilder::new("persona").template("sam").build().unwrap();
        store.create(template, &owner()).await.unwrap();

        let fresh = Block::human("fresh human");
        let fresh_id = fresh.id.clone();
        let clash = BlockBuilder::new("persona").template("sam").build().unwrap();

        let err = Memory::resolve(
            store.clone(),
            BlockMemory::new(vec![fresh, clash]).unwrap(),
            &owner(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TetherError::DuplicateKey { .. }));
        assert!(!store.id_taken(&fresh_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_rejects_deleted_block_id() {
        let store = store().await;
        let block = Block::human("gone");
        store.create(block.clone(), &owner()).await.unwrap();
        store.delete(&block.id, "user-1").await.unwrap();

        let err = Memory::resolve(store, BlockMemory::new(vec![block]).unwrap(), &owner())
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_resolve_rejects_other_users_block() {
        let store = store().await;
        let theirs = Block::human("First name: Chad");
        store.create(theirs.clone(), &owner()).await.unwrap();

        let fresh = Block::persona("mine");
        let fresh_id = fresh.id.clone();
        let err = Memory::resolve(
            store.clone(),
            BlockMemory::new(vec![fresh, theirs]).unwrap(),
            &Owner::new("user-2", "org-1"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TetherError::Validation(_)));
        assert!(!store.id_taken(&fresh_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_to_dict_and_compile() {
        let store = store().await;
        let memory = Memory::resolve(
            store,
            BlockMemory::chat("Name: Ada", "I am Sam").unwrap(),
            &owner(),
        )
        .await
        .unwrap();

        let dict = memory.to_dict().await.unwrap();
        assert_eq!(dict["human"]["value"], "Name: Ada");
        assert_eq!(dict["persona"]["limit"], CORE_MEMORY_BLOCK_CHAR_LIMIT);

        let compiled = memory.compile().await.unwrap();
        assert!(compiled.contains("<human characters=\"9/2000\">\nName: Ada\n</human>"));
        assert!(compiled.contains("<persona"));
    }

    #[tokio::test]
    async fn test_update_unknown_label() {
        let store = store().await;
        let memory = Memory::from_refs(store, BTreeMap::new());
        let err = memory
            .update_block_value("human", "x", "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }
}
