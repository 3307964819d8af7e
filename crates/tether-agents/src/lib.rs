//! Tether Agents - agent aggregate, agent server and base tools
//!
//! The [`AgentServer`] is where agents meet their memory blocks, tools and
//! message history. Everything above it (the client facade, the CLI) goes
//! through it.

pub mod server;
pub mod state;
pub mod store;
pub mod tools;

pub use server::AgentServer;
pub use state::{AgentState, AgentUpdate, CreateAgent};
pub use store::AgentStore;
pub use tools::{AgentHandles, base_tools};
