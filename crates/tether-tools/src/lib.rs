//! Tool registry for Tether
//!
//! Tools are compiled from a native callable or translated from an external
//! ecosystem, persisted per user, and run through the [`ToolRegistry`].

pub mod base;
pub mod compile;
pub mod external;
pub mod registry;
pub mod store;
pub mod tool;

pub use base::{AiTool, FnTool, ToolContext};
pub use compile::{CompiledTool, SourceDocument, compile, parse_source, verify};
pub use external::{ExternalTool, ExternalToolDescription, ImportMapping};
pub use registry::ToolRegistry;
pub use store::ToolStore;
pub use tool::{SourceType, Tool, ToolSource, ToolUpdate};
