//! In-process vector store with exact cosine search

use crate::{check_dimension, StoreError, StoreResult, VectorStore};
use async_trait::async_trait;
use ruleforge_common::metrics;
use ruleforge_common::models::{Chunk, IndexedPoint, SearchResult};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

const BACKEND: &str = "memory";

/// Shared collection held in memory.
///
/// `None` until `ensure_collection` runs, mirroring a server-side collection
/// that has not been created yet.
pub struct InMemoryVectorStore {
    dimension: usize,
    collection: RwLock<Option<HashMap<Uuid, IndexedPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            collection: RwLock::new(None),
        }
    }

    /// Number of stored points, 0 when the collection does not exist
    pub async fn len(&self) -> usize {
        self.collection.read().await.as_ref().map_or(0, HashMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn missing() -> StoreError {
        StoreError::CollectionMissing {
            collection: BACKEND.to_string(),
        }
    }
}

/// Cosine similarity; 0.0 when either side has zero norm
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self) -> StoreResult<()> {
        let mut guard = self.collection.write().await;
        if guard.is_none() {
            *guard = Some(HashMap::new());
            tracing::info!(backend = BACKEND, dimension = self.dimension, "Collection created");
        }
        Ok(())
    }

    async fn index_chunks(
        &self,
        game_id: &str,
        pdf_id: &str,
        chunks: &[Chunk],
    ) -> StoreResult<usize> {
        for chunk in chunks {
            check_dimension(self.dimension, &chunk.embedding)?;
        }

        let mut guard = self.collection.write().await;
        let points = guard.as_mut().ok_or_else(Self::missing)?;

        for (position, chunk) in chunks.iter().enumerate() {
            let point = IndexedPoint::from_chunk(game_id, pdf_id, position, chunk);
            points.insert(point.id, point);
        }

        metrics::record_indexing(BACKEND, chunks.len());
        tracing::debug!(game_id, pdf_id, count = chunks.len(), "Chunks indexed");
        Ok(chunks.len())
    }

    async fn search(
        &self,
        game_id: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.dimension, query_vector)?;

        let start = Instant::now();
        let guard = self.collection.read().await;
        let points = guard.as_ref().ok_or_else(Self::missing)?;

        let mut scored: Vec<(Uuid, SearchResult)> = points
            .values()
            .filter(|point| point.payload.game_id == game_id)
            .map(|point| {
                let score = cosine_similarity(query_vector, &point.vector);
                (point.id, SearchResult::from_payload(point.payload.clone(), score))
            })
            .collect();

        // Ties fall back to id order so repeated searches are stable
        scored.sort_by(|(id_a, a), (id_b, b)| b.score.total_cmp(&a.score).then(id_a.cmp(id_b)));
        scored.truncate(limit);

        let results: Vec<SearchResult> = scored.into_iter().map(|(_, result)| result).collect();
        metrics::record_search(start.elapsed().as_secs_f64(), BACKEND, results.len(), true);
        Ok(results)
    }

    async fn delete_document(&self, pdf_id: &str) -> StoreResult<()> {
        let mut guard = self.collection.write().await;
        if let Some(points) = guard.as_mut() {
            let before = points.len();
            points.retain(|_, point| point.payload.pdf_id != pdf_id);
            tracing::debug!(pdf_id, removed = before - points.len(), "Document deleted");
        }
        metrics::record_deletion(BACKEND, true);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        match self.collection.read().await.as_ref() {
            Some(_) => Ok(()),
            None => Err(Self::missing()),
        }
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}
