//! Type definitions shared by the memory stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tether_common::{format_timestamp, generate_id, now_rfc3339, parse_timestamp};

/// A stable identifier for a memory block.
///
/// Generated once when the block value is first built; agents hold this id,
/// never a copy of the block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Create a block ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        BlockId(id.into())
    }

    /// Generate a new random block ID
    pub fn generate() -> Self {
        BlockId(generate_id("block"))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        BlockId(s)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        BlockId(s.to_string())
    }
}

/// Audit columns carried by every persisted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditColumns {
    pub created_at: String,
    pub updated_at: String,
    pub created_by_id: Option<String>,
    pub last_updated_by_id: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl AuditColumns {
    /// Columns for a row created now by `actor`
    pub fn created_by(actor: &str) -> Self {
        let now = now_rfc3339();
        Self {
            created_at: now.clone(),
            updated_at: now,
            created_by_id: Some(actor.to_string()),
            last_updated_by_id: Some(actor.to_string()),
            is_deleted: false,
        }
    }

    /// Columns for a row created at a known time
    pub fn created_at(actor: &str, at: DateTime<Utc>) -> Self {
        let at = format_timestamp(at);
        Self {
            created_at: at.clone(),
            updated_at: at,
            created_by_id: Some(actor.to_string()),
            last_updated_by_id: Some(actor.to_string()),
            is_deleted: false,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        parse_timestamp(&self.created_at)
    }

    pub fn updated(&self) -> DateTime<Utc> {
        parse_timestamp(&self.updated_at)
    }
}

/// The user and organization a row belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: String,
    pub organization_id: String,
}

impl Owner {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_generation() {
        let id1 = BlockId::generate();
        let id2 = BlockId::generate();

        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("block-"));
    }

    #[test]
    fn test_block_id_serializes_as_plain_string() {
        let id = BlockId::new("block-abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"block-abc\"");
    }

    #[test]
    fn test_audit_columns() {
        let audit = AuditColumns::created_by("user-1");
        assert_eq!(audit.created_at, audit.updated_at);
        assert_eq!(audit.created_by_id.as_deref(), Some("user-1"));
        assert!(!audit.is_deleted);
    }
}
