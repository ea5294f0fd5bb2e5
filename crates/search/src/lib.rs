//! RuleForge Vector Index
//!
//! One shared collection holds every game's rulebook chunks. Tenancy is
//! payload-based: each point carries `gameId` and `pdfId`, searches filter on
//! `gameId`, deletions filter on `pdfId`.
//!
//! Backends:
//! - Qdrant through `qdrant-client` (gRPC)
//! - An in-process store with exact cosine search
//!
//! No backend retries or caches. Concurrency safety of the shared collection
//! is the backend's job.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use ruleforge_common::config::VectorStoreConfig;
use ruleforge_common::errors::AppError;
use ruleforge_common::models::{Chunk, SearchResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Vector store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store unreachable: {message}")]
    Transport { message: String },

    #[error("Vector store rejected the request ({code}): {message}")]
    Backend { code: String, message: String },

    #[error("Collection '{collection}' does not exist")]
    CollectionMissing { collection: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Malformed vector store response: {message}")]
    MalformedResponse { message: String },

    #[error("Vector store misconfigured: {message}")]
    Configuration { message: String },
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DimensionMismatch { .. } => AppError::Validation {
                message: err.to_string(),
                field: Some("embedding".to_string()),
            },
            StoreError::Configuration { message } => AppError::Configuration { message },
            other => AppError::VectorStore {
                message: other.to_string(),
            },
        }
    }
}

/// Operations on the shared rulebook collection
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection and its payload indexes if absent. Idempotent.
    async fn ensure_collection(&self) -> StoreResult<()>;

    /// Upsert one point per chunk and return how many were written.
    ///
    /// Points are keyed by document and chunk position, so re-indexing a
    /// document overwrites in place. A re-index with fewer chunks leaves the
    /// tail positions behind; call `delete_document` first to replace a
    /// document wholesale.
    async fn index_chunks(&self, game_id: &str, pdf_id: &str, chunks: &[Chunk])
        -> StoreResult<usize>;

    /// Nearest chunks of one game, best first, at most `limit`.
    ///
    /// An empty result is a success.
    async fn search(
        &self,
        game_id: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<SearchResult>>;

    /// Remove every point of a document across all games. Idempotent.
    async fn delete_document(&self, pdf_id: &str) -> StoreResult<()>;

    /// Cheap reachability check used by readiness
    async fn health_check(&self) -> StoreResult<()>;

    /// Backend label for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Reject vectors that do not match the collection dimension
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> StoreResult<()> {
    if vector.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Create a store based on configuration
pub fn create_store(config: &VectorStoreConfig, dimension: usize) -> StoreResult<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantStore::new(
            &config.url,
            &config.collection,
            config.api_key.clone(),
            dimension,
            Duration::from_secs(config.timeout_secs),
        )?)),
        "memory" => Ok(Arc::new(InMemoryVectorStore::new(dimension))),
        other => Err(StoreError::Configuration {
            message: format!("unknown vector store backend '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_store_by_backend() {
        let memory = VectorStoreConfig {
            backend: "memory".to_string(),
            ..VectorStoreConfig::default()
        };
        assert_eq!(create_store(&memory, 8).unwrap().backend(), "memory");

        let qdrant = VectorStoreConfig::default();
        assert_eq!(create_store(&qdrant, 8).unwrap().backend(), "qdrant");

        let unknown = VectorStoreConfig {
            backend: "faiss".to_string(),
            ..VectorStoreConfig::default()
        };
        assert!(matches!(
            create_store(&unknown, 8),
            Err(StoreError::Configuration { .. })
        ));
    }

    #[test]
    fn test_store_errors_map_to_app_errors() {
        let transport: AppError = StoreError::Transport {
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(transport.status_code().as_u16(), 503);

        let dims: AppError = StoreError::DimensionMismatch {
            expected: 3,
            actual: 2,
        }
        .into();
        assert_eq!(dims.status_code().as_u16(), 400);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(2, &[0.1, 0.2]).is_ok());
        assert!(matches!(
            check_dimension(3, &[0.1]),
            Err(StoreError::DimensionMismatch { expected: 3, actual: 1 })
        ));
    }
}
