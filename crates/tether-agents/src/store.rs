//! Agent persistence

use crate::state::{AgentRow, AgentState};
use serde_json::Value;
use std::sync::Arc;
use tether_common::{Result, TetherError};
use tether_memory::db::{Database, Filter, tables};
use tether_memory::BlockStore;
use tracing::debug;

/// SurrealDB-backed agent table
#[derive(Clone)]
pub struct AgentStore {
    db: Database,
    blocks: Arc<dyn BlockStore>,
}

impl AgentStore {
    pub fn new(db: Database, blocks: Arc<dyn BlockStore>) -> Self {
        Self { db, blocks }
    }

    pub(crate) async fn create(&self, row: &AgentRow) -> Result<AgentState> {
        self.db
            .create(tables::AGENTS, "agent", &row.agent_id, row)
            .await?;
        row.clone().into_state(self.blocks.clone())
    }

    pub async fn get(&self, id: &str) -> Result<Option<AgentState>> {
        let row: Option<AgentRow> = self.db.fetch(tables::AGENTS, id).await?;
        row.map(|r| r.into_state(self.blocks.clone())).transpose()
    }

    pub async fn get_by_name(&self, name: &str, user_id: &str) -> Result<Option<AgentState>> {
        let rows: Vec<AgentRow> = self
            .db
            .select(
                tables::AGENTS,
                Filter::new().eq("user_id", user_id).eq("name", name),
            )
            .await?;
        rows.into_iter()
            .next()
            .map(|r| r.into_state(self.blocks.clone()))
            .transpose()
    }

    /// A user's agents, oldest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<AgentState>> {
        let rows: Vec<AgentRow> = self
            .db
            .select(
                tables::AGENTS,
                Filter::new()
                    .eq("user_id", user_id)
                    .order_by("audit.created_at"),
            )
            .await?;
        rows.into_iter()
            .map(|r| r.into_state(self.blocks.clone()))
            .collect()
    }

    /// Write a checked patch as one record update
    pub(crate) async fn update(&self, id: &str, patch: Value, actor: &str) -> Result<AgentState> {
        let row: Option<AgentRow> = self.db.merge(tables::AGENTS, id, actor, patch).await?;
        debug!("Updated agent {}", id);
        row.ok_or_else(|| TetherError::not_found("agent", id))?
            .into_state(self.blocks.clone())
    }

    pub(crate) async fn delete(&self, id: &str, actor: &str) -> Result<bool> {
        self.db.soft_delete(tables::AGENTS, id, actor).await
    }
}
