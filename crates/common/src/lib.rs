//! RuleForge Common Library
//!
//! Shared code for all RuleForge crates including:
//! - Rulebook chunk, search result and streaming event models
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::{EmbeddingError, EmbeddingProvider};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Name of the shared collection holding every game's rulebook chunks
pub const DEFAULT_COLLECTION: &str = "rulebook_chunks";
