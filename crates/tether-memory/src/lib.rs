//! Tether Memory - persisted memory for agents
//!
//! Core memory blocks shared by id, plus archival passages and the recall
//! message history, all stored in an embedded SurrealDB.

pub mod archival;
pub mod block;
pub mod db;
pub mod memory;
pub mod recall;
pub mod store;
pub mod tenancy;
pub mod types;

pub use archival::{ArchivalMemory, Document, Passage};
pub use block::{Block, BlockBuilder};
pub use db::{Database, Filter};
pub use memory::{BlockMemory, Memory};
pub use recall::{Message, MessageRole, RecallMemory};
pub use store::{BlockQuery, BlockStore, SurrealBlockStore};
pub use tenancy::Tenancy;
pub use types::{AuditColumns, BlockId, Owner};
