//! RuleForge Explain Orchestrator
//!
//! Turns a rulebook topic into an ordered, lazily produced event stream:
//!
//! ```text
//! StateUpdate  "Generating embeddings for topic..."
//! StateUpdate  "Searching vector database..."
//! Citations    one per retrieved passage
//! StateUpdate  "Building outline..."
//! Outline      topic + truncated passage previews
//! StateUpdate  "Generating explanation script..."
//! ScriptChunk  0..totalChunks
//! Complete     reading time, zero token usage, confidence
//! ```
//!
//! Expected failures end the stream with a single `Error` event
//! (`EMPTY_TOPIC`, `EMBEDDING_FAILED`, `NO_RESULTS`). Cancellation and
//! misconfiguration surface as `Err` items instead, after which the stream
//! yields nothing more.

mod orchestrator;
mod outline;
mod script;

pub use orchestrator::{EventStream, ExplainRequest, ExplainService};
pub use outline::{build_citations, build_outline, section_title};
pub use script::{compose_script, estimate_reading_minutes, split_script};

use ruleforge_common::config::ExplainConfig;
use ruleforge_common::embeddings::EmbeddingError;
use ruleforge_search::StoreError;
use thiserror::Error;

/// Faults that are not user-facing `Error` events
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The consumer asked the stream to stop
    #[error("explain stream cancelled")]
    Cancelled,

    /// The embedding provider cannot work as configured
    #[error("embedding provider misconfigured: {0}")]
    Embedding(#[source] EmbeddingError),

    /// The vector store rejected the query shape (e.g. dimension mismatch)
    #[error("vector store misconfigured: {0}")]
    Store(#[source] StoreError),
}

/// Pipeline tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainOptions {
    /// Passages retrieved per topic
    pub top_k: usize,
    /// Script chunk size in characters
    pub script_chunk_size: usize,
    /// Outline section title length, ellipsis included
    pub section_title_max_chars: usize,
    pub words_per_minute: usize,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self::from(&ExplainConfig::default())
    }
}

impl From<&ExplainConfig> for ExplainOptions {
    fn from(config: &ExplainConfig) -> Self {
        Self {
            top_k: config.top_k,
            script_chunk_size: config.script_chunk_size,
            section_title_max_chars: config.section_title_max_chars,
            words_per_minute: config.words_per_minute,
        }
    }
}
