//! Archival memory
//!
//! Inserted text is kept whole as a [`Document`] and split into word-bounded
//! [`Passage`]s keyed to the agent. Passages are append-only; each can be
//! deleted on its own.

use crate::db::{Database, Filter, tables};
use crate::types::{AuditColumns, Owner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_common::{Result, TetherError, chunk_words, generate_id, next_sequence};
use tracing::{debug, info};

/// The full text of one archival insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub agent_id: String,
    pub text: String,
    pub user_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
}

/// One chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub agent_id: String,
    pub document_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentRow {
    document_id: String,
    agent_id: String,
    text: String,
    user_id: String,
    organization_id: String,
    audit: AuditColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PassageRow {
    passage_id: String,
    agent_id: String,
    document_id: String,
    organization_id: String,
    user_id: String,
    text: String,
    seq: u64,
    audit: AuditColumns,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.document_id,
            agent_id: row.agent_id,
            text: row.text,
            user_id: row.user_id,
            organization_id: row.organization_id,
            created_at: row.audit.created(),
        }
    }
}

impl From<PassageRow> for Passage {
    fn from(row: PassageRow) -> Self {
        Passage {
            id: row.passage_id,
            agent_id: row.agent_id,
            document_id: row.document_id,
            organization_id: row.organization_id,
            user_id: row.user_id,
            text: row.text,
            created_at: row.audit.created(),
        }
    }
}

/// Documents and passages for every agent
#[derive(Clone)]
pub struct ArchivalMemory {
    db: Database,
}

impl ArchivalMemory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store `text` for an agent, chunked into passages of at most `chunk_size` words
    pub async fn insert(
        &self,
        agent_id: &str,
        owner: &Owner,
        text: &str,
        chunk_size: usize,
    ) -> Result<Vec<Passage>> {
        let chunks = chunk_words(text, chunk_size);
        if chunks.is_empty() {
            return Err(TetherError::validation("archival text must not be empty"));
        }

        let document = DocumentRow {
            document_id: generate_id("doc"),
            agent_id: agent_id.to_string(),
            text: text.to_string(),
            user_id: owner.user_id.clone(),
            organization_id: owner.organization_id.clone(),
            audit: AuditColumns::created_by(&owner.user_id),
        };
        self.db
            .create(tables::DOCUMENTS, "document", &document.document_id, &document)
            .await?;

        let mut passages = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let row = PassageRow {
                passage_id: generate_id("passage"),
                agent_id: agent_id.to_string(),
                document_id: document.document_id.clone(),
                organization_id: owner.organization_id.clone(),
                user_id: owner.user_id.clone(),
                text: chunk,
                seq: next_sequence(),
                audit: AuditColumns::created_by(&owner.user_id),
            };
            self.db
                .create(tables::PASSAGES, "passage", &row.passage_id, &row)
                .await?;
            passages.push(Passage::from(row));
        }

        info!(
            "Archived {} passage(s) for agent {} from document {}",
            passages.len(),
            agent_id,
            document.document_id
        );
        Ok(passages)
    }

    /// All of an agent's passages in insertion order
    pub async fn list(&self, agent_id: &str) -> Result<Vec<Passage>> {
        let rows: Vec<PassageRow> = self
            .db
            .select(
                tables::PASSAGES,
                Filter::new().eq("agent_id", agent_id).order_by("seq"),
            )
            .await?;
        Ok(rows.into_iter().map(Passage::from).collect())
    }

    pub async fn get(&self, passage_id: &str) -> Result<Option<Passage>> {
        let row: Option<PassageRow> = self.db.fetch(tables::PASSAGES, passage_id).await?;
        Ok(row.map(Passage::from))
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = self.db.fetch(tables::DOCUMENTS, document_id).await?;
        Ok(row.map(Document::from))
    }

    /// Remove exactly one passage. Missing passages are a no-op; a passage
    /// owned by another agent is an error.
    pub async fn delete(&self, agent_id: &str, passage_id: &str, actor: &str) -> Result<bool> {
        match self.get(passage_id).await? {
            None => Ok(false),
            Some(passage) if passage.agent_id != agent_id => Err(TetherError::validation(
                format!("passage {} does not belong to agent {}", passage_id, agent_id),
            )),
            Some(_) => {
                let deleted = self
                    .db
                    .soft_delete(tables::PASSAGES, passage_id, actor)
                    .await?;
                debug!("Deleted passage {} of agent {}", passage_id, agent_id);
                Ok(deleted)
            }
        }
    }

    /// Case-insensitive substring search over an agent's passages
    pub async fn search(&self, agent_id: &str, query: &str, limit: usize) -> Result<Vec<Passage>> {
        let needle = query.to_lowercase();
        Ok(self
            .list(agent_id)
            .await?
            .into_iter()
            .filter(|p| p.text.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }

    /// Remove every document and passage of an agent
    pub async fn delete_for_agent(&self, agent_id: &str, actor: &str) -> Result<usize> {
        let passages = self
            .db
            .soft_delete_where(tables::PASSAGES, "agent_id", agent_id, actor)
            .await?;
        self.db
            .soft_delete_where(tables::DOCUMENTS, "agent_id", agent_id, actor)
            .await?;
        Ok(passages)
    }
}
