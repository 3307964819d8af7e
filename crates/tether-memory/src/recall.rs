//! Recall memory: the append-only message history of each agent

use crate::db::{Database, Filter, tables};
use crate::types::AuditColumns;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tether_common::{Result, TetherError, generate_id, next_sequence};
use tracing::debug;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(TetherError::validation(format!(
                "unknown message role '{}'",
                other
            ))),
        }
    }
}

/// A single message in an agent's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub text: String,
    /// Tool name for tool messages
    pub name: Option<String>,
    pub tool_call_id: Option<String>,
    /// Insertion order within the whole store
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        role: MessageRole,
        text: impl Into<String>,
    ) -> Self {
        Message {
            id: generate_id("message"),
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            role,
            text: text.into(),
            name: None,
            tool_call_id: None,
            seq: next_sequence(),
            created_at: Utc::now(),
        }
    }

    /// A tool result message
    pub fn tool(
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(agent_id, user_id, MessageRole::Tool, text);
        message.name = Some(tool_name.into());
        message.tool_call_id = Some(generate_id("call"));
        message
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({}): {}", self.role, name, self.text),
            None => write!(f, "{}: {}", self.role, self.text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageRow {
    message_id: String,
    agent_id: String,
    user_id: String,
    /// Stored as its lowercase name
    role: String,
    text: String,
    name: Option<String>,
    tool_call_id: Option<String>,
    seq: u64,
    audit: AuditColumns,
}

impl From<&Message> for MessageRow {
    fn from(message: &Message) -> Self {
        MessageRow {
            message_id: message.id.clone(),
            agent_id: message.agent_id.clone(),
            user_id: message.user_id.clone(),
            role: message.role.to_string(),
            text: message.text.clone(),
            name: message.name.clone(),
            tool_call_id: message.tool_call_id.clone(),
            seq: message.seq,
            audit: AuditColumns::created_at(&message.user_id, message.created_at),
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.message_id,
            agent_id: row.agent_id,
            user_id: row.user_id,
            role: row.role.parse().unwrap_or(MessageRole::User),
            text: row.text,
            name: row.name,
            tool_call_id: row.tool_call_id,
            seq: row.seq,
            created_at: row.audit.created(),
        }
    }
}

/// Message history for every agent
#[derive(Clone)]
pub struct RecallMemory {
    db: Database,
}

impl RecallMemory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message and return it as stored
    pub async fn append(&self, message: Message) -> Result<Message> {
        let row = MessageRow::from(&message);
        self.db
            .create(tables::MESSAGES, "message", &row.message_id, &row)
            .await?;
        debug!(
            "Appended {} message {} for agent {}",
            row.role, row.message_id, row.agent_id
        );
        Ok(Message::from(row))
    }

    /// Full history of an agent, oldest first
    pub async fn list(&self, agent_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = self
            .db
            .select(
                tables::MESSAGES,
                Filter::new().eq("agent_id", agent_id).order_by("seq"),
            )
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    pub async fn get(&self, message_id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = self.db.fetch(tables::MESSAGES, message_id).await?;
        Ok(row.map(Message::from))
    }

    /// Messages with the given ids, in the order of `ids`; unknown ids are skipped
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = self
            .db
            .fetch_many(tables::MESSAGES, "message_id", ids)
            .await?;
        let mut by_id: HashMap<String, Message> = rows
            .into_iter()
            .map(|row| (row.message_id.clone(), Message::from(row)))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Case-insensitive substring search over an agent's history
    pub async fn search(&self, agent_id: &str, query: &str, limit: usize) -> Result<Vec<Message>> {
        let needle = query.to_lowercase();
        Ok(self
            .list(agent_id)
            .await?
            .into_iter()
            .filter(|m| m.text.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }

    pub async fn count(&self, agent_id: &str) -> Result<usize> {
        Ok(self.list(agent_id).await?.len())
    }

    /// Remove an agent's whole history
    pub async fn delete_for_agent(&self, agent_id: &str, actor: &str) -> Result<usize> {
        self.db
            .soft_delete_where(tables::MESSAGES, "agent_id", agent_id, actor)
            .await
    }
}
