//! Embedded SurrealDB connection shared by every Tether store
//!
//! Each row carries its own `<entity>_id` column so the record key never has to
//! be parsed back out of a SurrealDB record id, and an `audit` object holding
//! the timestamps, actor references and the soft-delete flag.

use crate::types::AuditColumns;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use surrealdb::{
    Surreal,
    engine::local::{Db, Mem, SurrealKv},
};
use tether_common::{Result, StorageBackend, StorageConfig, TetherError, now_rfc3339};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Table names
pub mod tables {
    pub const ORGANIZATIONS: &str = "organizations";
    pub const USERS: &str = "users";
    pub const BLOCKS: &str = "blocks";
    pub const AGENTS: &str = "agents";
    pub const TOOLS: &str = "tools";
    pub const DOCUMENTS: &str = "documents";
    pub const PASSAGES: &str = "passages";
    pub const MESSAGES: &str = "messages";

    pub const ALL: [&str; 8] = [
        ORGANIZATIONS,
        USERS,
        BLOCKS,
        AGENTS,
        TOOLS,
        DOCUMENTS,
        PASSAGES,
        MESSAGES,
    ];
}

const INDEXES: &str = "
    DEFINE INDEX IF NOT EXISTS block_owner ON TABLE blocks FIELDS user_id, label;
    DEFINE INDEX IF NOT EXISTS agent_owner ON TABLE agents FIELDS user_id, name;
    DEFINE INDEX IF NOT EXISTS tool_owner ON TABLE tools FIELDS user_id, name;
    DEFINE INDEX IF NOT EXISTS document_agent ON TABLE documents FIELDS agent_id;
    DEFINE INDEX IF NOT EXISTS passage_agent ON TABLE passages FIELDS agent_id, seq;
    DEFINE INDEX IF NOT EXISTS message_agent ON TABLE messages FIELDS agent_id, seq;
";

#[derive(Deserialize)]
struct AuditOnly {
    #[allow(dead_code)]
    audit: AuditColumns,
}

/// Equality filter over non-deleted rows, with an optional ascending sort column
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(&'static str, Value)>,
    order_by: Option<&'static str>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field = value`
    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push((field, value.into()));
        self
    }

    /// Require `field = value` only when a value is given
    pub fn eq_opt(self, field: &'static str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    pub fn order_by(mut self, field: &'static str) -> Self {
        self.order_by = Some(field);
        self
    }

    fn where_clause(&self) -> String {
        let mut clause = String::from(" WHERE audit.is_deleted = false");
        for (i, (field, _)) in self.conditions.iter().enumerate() {
            clause.push_str(&format!(" AND {} = $p{}", field, i));
        }
        clause
    }
}

/// Handle to the embedded database; cheap to clone
#[derive(Clone)]
pub struct Database {
    db: Surreal<Db>,
    initialized: Arc<RwLock<bool>>,
}

impl Database {
    /// Open the configured backend and define the schema
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let db: Surreal<Db> = match config.backend {
            StorageBackend::SurrealFile => {
                let path = config.path.clone().ok_or_else(|| {
                    TetherError::Config("file storage requires a path".to_string())
                })?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                debug!("Opening SurrealDB file store at {:?}", path);
                Surreal::new::<SurrealKv>(path)
                    .await
                    .map_err(|e| TetherError::storage("open file store", e))?
            }
            StorageBackend::SurrealMemory => {
                debug!("Opening in-memory SurrealDB");
                Surreal::new::<Mem>(())
                    .await
                    .map_err(|e| TetherError::storage("open memory store", e))?
            }
        };

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| TetherError::storage("select namespace/database", e))?;

        let database = Self {
            db,
            initialized: Arc::new(RwLock::new(false)),
        };
        database.initialize_schema().await?;
        info!("SurrealDB ready ({:?})", config.backend);
        Ok(database)
    }

    /// A fresh in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&StorageConfig::in_memory()).await
    }

    /// Define tables and indexes; safe to call repeatedly
    pub async fn initialize_schema(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        let tables: String = tables::ALL
            .iter()
            .map(|t| format!("DEFINE TABLE IF NOT EXISTS {} SCHEMALESS;\n", t))
            .collect();

        self.db
            .query(tables)
            .query(INDEXES)
            .await
            .and_then(|r| r.check())
            .map_err(|e| TetherError::storage("define schema", e))?;

        *initialized = true;
        debug!("Schema defined for {} tables", tables::ALL.len());
        Ok(())
    }

    /// Insert a new row keyed by `id`; `DuplicateKey` when the key is taken,
    /// including by a soft-deleted row
    pub async fn create<T: Serialize>(
        &self,
        table: &'static str,
        resource: &'static str,
        id: &str,
        row: &T,
    ) -> Result<()> {
        if self.exists(table, id).await? {
            return Err(TetherError::duplicate_key(resource, id));
        }

        let content = serde_json::to_value(row)?;
        self.db
            .query("CREATE type::thing($tb, $id) CONTENT $content RETURN NONE")
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .bind(("content", content))
            .await
            .and_then(|r| r.check())
            .map_err(|e| TetherError::storage(&format!("create {}", resource), e))?;

        debug!("Created {} {}", resource, id);
        Ok(())
    }

    /// True when a row with this key exists, deleted or not
    pub async fn exists(&self, table: &'static str, id: &str) -> Result<bool> {
        let mut response = self
            .db
            .query("SELECT VALUE audit.is_deleted FROM type::thing($tb, $id)")
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .await
            .map_err(|e| TetherError::storage("check key", e))?;

        let rows: Vec<bool> = response
            .take(0)
            .map_err(|e| TetherError::storage("check key", e))?;
        Ok(!rows.is_empty())
    }

    /// Fetch a live row by key
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        table: &'static str,
        id: &str,
    ) -> Result<Option<T>> {
        let mut response = self
            .db
            .query("SELECT * FROM type::thing($tb, $id) WHERE audit.is_deleted = false")
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .await
            .map_err(|e| TetherError::storage(&format!("fetch from {}", table), e))?;

        let rows: Vec<T> = Self::decode_rows(&mut response, table)?;
        Ok(rows.into_iter().next())
    }

    /// Fetch live rows whose `key` column is in `ids`; order is unspecified
    pub async fn fetch_many<T: DeserializeOwned>(
        &self,
        table: &'static str,
        key: &'static str,
        ids: &[String],
    ) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM type::table($tb) WHERE audit.is_deleted = false AND {} IN $ids",
            key
        );
        let mut response = self
            .db
            .query(sql)
            .bind(("tb", table))
            .bind(("ids", ids.to_vec()))
            .await
            .map_err(|e| TetherError::storage(&format!("fetch from {}", table), e))?;

        Self::decode_rows(&mut response, table)
    }

    /// All live rows matching `filter`
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        filter: Filter,
    ) -> Result<Vec<T>> {
        let mut sql = format!("SELECT * FROM type::table($tb){}", filter.where_clause());
        if let Some(order) = filter.order_by {
            sql.push_str(&format!(" ORDER BY {} ASC", order));
        }

        let mut query = self.db.query(sql).bind(("tb", table));
        for (i, (_, value)) in filter.conditions.into_iter().enumerate() {
            query = query.bind((format!("p{}", i), value));
        }

        let mut response = query
            .await
            .map_err(|e| TetherError::storage(&format!("select from {}", table), e))?;

        Self::decode_rows(&mut response, table)
    }

    /// Merge `patch` into a live row, stamping the audit columns.
    ///
    /// Returns the row after the write, or `None` when no live row has this key.
    pub async fn merge<T: DeserializeOwned>(
        &self,
        table: &'static str,
        id: &str,
        actor: &str,
        patch: Value,
    ) -> Result<Option<T>> {
        if !patch.is_object() {
            return Err(TetherError::validation("patch must be an object"));
        }

        let mut response = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) SET audit.updated_at = $now, \
                 audit.last_updated_by_id = $actor WHERE audit.is_deleted = false RETURN NONE",
            )
            .query("UPDATE type::thing($tb, $id) MERGE $patch WHERE audit.is_deleted = false RETURN AFTER")
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .bind(("now", now_rfc3339()))
            .bind(("actor", actor.to_string()))
            .bind(("patch", patch))
            .await
            .and_then(|r| r.check())
            .map_err(|e| TetherError::storage(&format!("update {}", table), e))?;

        let rows: Vec<T> = response
            .take(1)
            .map_err(|e| TetherError::storage(&format!("read {}", table), e))?;
        Ok(rows.into_iter().next())
    }

    /// Soft-delete one row; returns whether a live row was deleted
    pub async fn soft_delete(&self, table: &'static str, id: &str, actor: &str) -> Result<bool> {
        let mut response = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) SET audit.is_deleted = true, audit.updated_at = $now, \
                 audit.last_updated_by_id = $actor WHERE audit.is_deleted = false RETURN AFTER",
            )
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .bind(("now", now_rfc3339()))
            .bind(("actor", actor.to_string()))
            .await
            .and_then(|r| r.check())
            .map_err(|e| TetherError::storage(&format!("delete from {}", table), e))?;

        let rows: Vec<AuditOnly> = response
            .take(0)
            .map_err(|e| TetherError::storage(&format!("delete from {}", table), e))?;
        Ok(!rows.is_empty())
    }

    /// Soft-delete every live row where `field = value`; returns the count
    pub async fn soft_delete_where(
        &self,
        table: &'static str,
        field: &'static str,
        value: &str,
        actor: &str,
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE type::table($tb) SET audit.is_deleted = true, audit.updated_at = $now, \
             audit.last_updated_by_id = $actor WHERE audit.is_deleted = false AND {} = $value \
             RETURN AFTER",
            field
        );
        let mut response = self
            .db
            .query(sql)
            .bind(("tb", table))
            .bind(("now", now_rfc3339()))
            .bind(("actor", actor.to_string()))
            .bind(("value", value.to_string()))
            .await
            .and_then(|r| r.check())
            .map_err(|e| TetherError::storage(&format!("delete from {}", table), e))?;

        let rows: Vec<AuditOnly> = response
            .take(0)
            .map_err(|e| TetherError::storage(&format!("delete from {}", table), e))?;
        Ok(rows.len())
    }

    fn decode_rows<T: DeserializeOwned>(
        response: &mut surrealdb::Response,
        table: &str,
    ) -> Result<Vec<T>> {
        response
            .take(0)
            .map_err(|e| TetherError::storage(&format!("read {}", table), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Row {
        row_id: String,
        owner: String,
        seq: u64,
        audit: AuditColumns,
    }

    fn row(id: &str, owner: &str, seq: u64) -> Row {
        Row {
            row_id: id.to_string(),
            owner: owner.to_string(),
            seq,
            audit: AuditColumns::created_by(owner),
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.initialize_schema().await.unwrap();
        *db.initialized.write().await = false;
        db.initialize_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let db = Database::in_memory().await.unwrap();
        db.create(tables::BLOCKS, "block", "block-1", &row("block-1", "u1", 1))
            .await
            .unwrap();

        let fetched: Row = db.fetch(tables::BLOCKS, "block-1").await.unwrap().unwrap();
        assert_eq!(fetched.row_id, "block-1");
        assert_eq!(fetched.seq, 1);
        assert_eq!(fetched.audit.created_by_id.as_deref(), Some("u1"));

        let missing: Option<Row> = db.fetch(tables::BLOCKS, "block-2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        db.create(tables::BLOCKS, "block", "block-1", &row("block-1", "u1", 1))
            .await
            .unwrap();

        let err = db
            .create(tables::BLOCKS, "block", "block-1", &row("block-1", "u2", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let db = Database::in_memory().await.unwrap();
        for (id, owner, seq) in [("m-3", "u1", 30), ("m-1", "u1", 10), ("m-2", "u2", 20)] {
            db.create(tables::MESSAGES, "message", id, &row(id, owner, seq))
                .await
                .unwrap();
        }

        let rows: Vec<Row> = db
            .select(
                tables::MESSAGES,
                Filter::new().eq("owner", "u1").order_by("seq"),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.row_id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-3"]);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_row_and_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.create(tables::AGENTS, "agent", "agent-1", &row("agent-1", "u1", 1))
            .await
            .unwrap();

        assert!(db.soft_delete(tables::AGENTS, "agent-1", "u1").await.unwrap());
        assert!(!db.soft_delete(tables::AGENTS, "agent-1", "u1").await.unwrap());

        let fetched: Option<Row> = db.fetch(tables::AGENTS, "agent-1").await.unwrap();
        assert!(fetched.is_none());
        assert!(db.exists(tables::AGENTS, "agent-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_only_touches_live_rows() {
        let db = Database::in_memory().await.unwrap();
        db.create(tables::TOOLS, "tool", "tool-1", &row("tool-1", "u1", 1))
            .await
            .unwrap();

        let updated: Row = db
            .merge(tables::TOOLS, "tool-1", "u2", json!({ "owner": "u9" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.owner, "u9");
        assert_eq!(updated.audit.last_updated_by_id.as_deref(), Some("u2"));
        assert_eq!(updated.audit.created_by_id.as_deref(), Some("u1"));

        let missing: Option<Row> = db
            .merge(tables::TOOLS, "tool-2", "u1", json!({ "owner": "u9" }))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::SurrealFile,
            path: Some(dir.path().join("tether.db")),
            ..Default::default()
        };

        let db = Database::connect(&config).await.unwrap();
        db.create(tables::BLOCKS, "block", "block-1", &row("block-1", "u1", 7))
            .await
            .unwrap();

        assert!(dir.path().join("tether.db").exists());
        let fetched: Row = db.fetch(tables::BLOCKS, "block-1").await.unwrap().unwrap();
        assert_eq!(fetched.seq, 7);
    }
}
