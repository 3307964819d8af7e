//! Common constants used across Tether

/// Default character limit for a core memory block
pub const CORE_MEMORY_BLOCK_CHAR_LIMIT: usize = 2000;

/// Messages kept in an agent's context window before trimming
pub const DEFAULT_MAX_IN_CONTEXT_MESSAGES: usize = 64;

/// Default embedding dimension for OpenAI text-embedding-ada-002
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Archival passages are cut at this many words
pub const DEFAULT_EMBEDDING_CHUNK_SIZE: usize = 300;

/// Identity used by a local client when none is configured
pub const DEFAULT_USER_ID: &str = "user-00000000-0000-4000-8000-000000000000";
pub const DEFAULT_ORG_ID: &str = "org-00000000-0000-4000-8000-000000000000";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a persistent conversational agent. \
Your core memory is shown below and is always in context. Edit it with your memory \
tools when you learn something worth keeping. Older conversation lives in recall \
memory and long-term notes live in archival memory; search them when needed.";

/// Default limit for listing queries
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Well-known block labels
pub mod labels {
    pub const HUMAN: &str = "human";
    pub const PERSONA: &str = "persona";
}

/// Default template blocks seeded for every user
pub mod templates {
    pub const DEFAULT_HUMAN: &str = "basic";
    pub const DEFAULT_PERSONA: &str = "sam";

    pub const BASIC_HUMAN: &str = "First name: Chad";
    pub const SAM_PERSONA: &str = "The following is a starter persona, and it can be expanded \
as the personality develops:\n\nYour name is Sam. You are kind, thoughtful, and inquisitive.";
}

/// Names of the base tools every agent starts with
pub mod base_tools {
    pub const SEND_MESSAGE: &str = "send_message";
    pub const CONVERSATION_SEARCH: &str = "conversation_search";
    pub const ARCHIVAL_MEMORY_INSERT: &str = "archival_memory_insert";
    pub const ARCHIVAL_MEMORY_SEARCH: &str = "archival_memory_search";
    pub const CORE_MEMORY_APPEND: &str = "core_memory_append";
    pub const CORE_MEMORY_REPLACE: &str = "core_memory_replace";

    pub const ALL: [&str; 6] = [
        SEND_MESSAGE,
        CONVERSATION_SEARCH,
        ARCHIVAL_MEMORY_INSERT,
        ARCHIVAL_MEMORY_SEARCH,
        CORE_MEMORY_APPEND,
        CORE_MEMORY_REPLACE,
    ];
}

/// Common model identifiers
pub mod models {
    pub const GPT_4: &str = "gpt-4";
    pub const GPT_4_TURBO: &str = "gpt-4-turbo";
    pub const GPT_4O: &str = "gpt-4o";
    pub const GPT_4O_MINI: &str = "gpt-4o-mini";
    pub const GPT_3_5_TURBO: &str = "gpt-3.5-turbo";
}

/// Embedding model identifiers
pub mod embeddings {
    pub const ADA_002: &str = "text-embedding-ada-002";
    pub const BGE_LARGE: &str = "BAAI/bge-large-en-v1.5";
}

/// Common provider identifiers
pub mod providers {
    pub const OPENAI: &str = "openai";
    pub const HUGGING_FACE: &str = "hugging-face";

    pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
    pub const HUGGING_FACE_ENDPOINT: &str = "https://embeddings.memgpt.ai";
}
