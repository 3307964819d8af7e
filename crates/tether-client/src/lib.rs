//! Tether Client - the facade over agents, tools and memory
//!
//! [`LocalClient`] runs everything in-process over an embedded database. The
//! member crates are re-exported so callers only need this one.

pub mod client;
pub mod local;

pub use client::AgentClient;
pub use local::LocalClient;

pub use tether_agents as agents;
pub use tether_common as common;
pub use tether_memory as memory;
pub use tether_tools as tools;

/// Convenience prelude module for common imports
pub mod prelude {
    pub use crate::{AgentClient, LocalClient};
    pub use tether_agents::{AgentState, AgentUpdate, CreateAgent};
    pub use tether_common::{EmbeddingConfig, LlmConfig, Result, TetherConfig, TetherError};
    pub use tether_memory::{Block, BlockId, BlockMemory, Memory, Message, MessageRole, Passage};
    pub use tether_tools::{
        AiTool, ExternalToolDescription, FnTool, ImportMapping, Tool, ToolContext, ToolUpdate,
    };
}
