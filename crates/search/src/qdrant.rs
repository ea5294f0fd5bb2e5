//! Qdrant backend over the official gRPC client

use crate::{check_dimension, StoreError, StoreResult, VectorStore};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
    VectorsConfig,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use ruleforge_common::metrics;
use ruleforge_common::models::{Chunk, IndexedPoint, PointPayload, SearchResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tonic::Code;

const BACKEND: &str = "qdrant";

/// Payload fields that get a keyword index for filtering
const INDEXED_FIELDS: [&str; 2] = ["gameId", "pdfId"];

/// Points per upsert request
const UPSERT_BATCH_SIZE: usize = 256;

/// Qdrant client bound to one collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    pub fn new(
        url: &str,
        collection: &str,
        api_key: Option<String>,
        dimension: usize,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key.filter(|key| !key.is_empty()))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| StoreError::Configuration {
                message: format!("Failed to create Qdrant client: {}", e),
            })?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// Map a client failure, naming this store's collection when it is absent
    fn store_error(&self, err: QdrantError) -> StoreError {
        match err {
            QdrantError::ResponseError { status } => match status.code() {
                Code::NotFound => StoreError::CollectionMissing {
                    collection: self.collection.clone(),
                },
                Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => {
                    StoreError::Transport {
                        message: status.message().to_string(),
                    }
                }
                code => StoreError::Backend {
                    code: format!("{:?}", code),
                    message: status.message().to_string(),
                },
            },
            other => StoreError::Transport {
                message: other.to_string(),
            },
        }
    }

    async fn create_collection(&self) -> StoreResult<()> {
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(self.collection.as_str()).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await;

        match result.map_err(|e| self.store_error(e)) {
            Ok(_) => {
                tracing::info!(collection = %self.collection, dimension = self.dimension, "Collection created");
                Ok(())
            }
            // Another instance won the creation race
            Err(StoreError::Backend { code, .. }) if code == "AlreadyExists" => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn ensure_payload_indexes(&self) -> StoreResult<()> {
        for field in INDEXED_FIELDS {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(
                        self.collection.as_str(),
                        field,
                        FieldType::Keyword,
                    )
                    .wait(true),
                )
                .await
                .map_err(|e| self.store_error(e))?;
        }
        Ok(())
    }

    async fn search_inner(
        &self,
        game_id: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection.as_str(), query_vector.to_vec(), limit as u64)
                    .filter(match_filter("gameId", game_id))
                    .with_payload(true),
            )
            .await
            .map_err(|e| self.store_error(e))?;

        let hits = response.result.into_iter().map(decode_hit).collect();
        Ok(collect_results(hits, game_id, limit))
    }
}

fn match_filter(key: &str, value: &str) -> Filter {
    Filter::must([Condition::matches(key, value.to_string())])
}

fn to_point_struct(point: &IndexedPoint) -> StoreResult<PointStruct> {
    let json = serde_json::to_value(&point.payload).map_err(|e| StoreError::Configuration {
        message: format!("Unencodable payload: {}", e),
    })?;
    let payload = Payload::try_from(json).map_err(|e| StoreError::Configuration {
        message: format!("Unencodable payload: {}", e),
    })?;
    Ok(PointStruct::new(point.id.to_string(), point.vector.clone(), payload))
}

/// Read our payload back out of Qdrant's value map
fn decode_payload(fields: HashMap<String, QdrantValue>) -> Option<PointPayload> {
    if fields.is_empty() {
        return None;
    }
    let json = serde_json::Value::from(Payload::from(fields));
    match serde_json::from_value(json) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable point payload");
            None
        }
    }
}

fn decode_hit(point: ScoredPoint) -> (f32, Option<PointPayload>) {
    (point.score, decode_payload(point.payload))
}

/// Turn scored hits into results, re-checking the game filter
fn collect_results(
    hits: Vec<(f32, Option<PointPayload>)>,
    game_id: &str,
    limit: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .filter_map(|(score, payload)| match payload {
            Some(payload) if payload.game_id == game_id => {
                Some(SearchResult::from_payload(payload, score))
            }
            Some(payload) => {
                tracing::warn!(
                    requested = game_id,
                    returned = %payload.game_id,
                    "Dropping search hit from another game"
                );
                None
            }
            None => {
                tracing::warn!("Dropping search hit without payload");
                None
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
    results
}

/// Vector size of a collection with a single unnamed vector
fn reported_dimension(vectors: Option<&VectorsConfig>) -> Option<usize> {
    match vectors?.config.as_ref()? {
        vectors_config::Config::Params(params) => Some(params.size as usize),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self) -> StoreResult<()> {
        let exists = self
            .client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(|e| self.store_error(e))?;

        if exists {
            let info = self
                .client
                .collection_info(self.collection.as_str())
                .await
                .map_err(|e| self.store_error(e))?;
            let vectors = info
                .result
                .as_ref()
                .and_then(|info| info.config.as_ref())
                .and_then(|config| config.params.as_ref())
                .and_then(|params| params.vectors_config.as_ref());
            if let Some(actual) = reported_dimension(vectors) {
                if actual != self.dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: self.dimension,
                        actual,
                    });
                }
            }
        } else {
            self.create_collection().await?;
        }

        self.ensure_payload_indexes().await?;
        tracing::info!(collection = %self.collection, "Collection ready");
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

        let points = chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| {
                to_point_struct(&IndexedPoint::from_chunk(game_id, pdf_id, position, chunk))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut indexed = 0;
        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            self.client
                .upsert_points(
                    UpsertPointsBuilder::new(self.collection.as_str(), batch.to_vec()).wait(true),
                )
                .await
                .map_err(|e| self.store_error(e))?;
            indexed += batch.len();
        }

        metrics::record_indexing(BACKEND, indexed);
        tracing::info!(game_id, pdf_id, indexed, "Chunks indexed");
        Ok(indexed)
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
        let result = self.search_inner(game_id, query_vector, limit).await;

        metrics::record_search(
            start.elapsed().as_secs_f64(),
            BACKEND,
            result.as_ref().map_or(0, Vec::len),
            result.is_ok(),
        );
        if let Err(e) = &result {
            tracing::warn!(game_id, error = %e, "Vector search failed");
        }
        result
    }

    async fn delete_document(&self, pdf_id: &str) -> StoreResult<()> {
        let result = self
            .client
            .delete_points(
                DeletePointsBuilder::new(self.collection.as_str())
                    .points(match_filter("pdfId", pdf_id))
                    .wait(true),
            )
            .await
            .map_err(|e| self.store_error(e));

        let result = match result {
            Ok(_) => Ok(()),
            // No collection means no points for this document
            Err(StoreError::CollectionMissing { .. }) => Ok(()),
            Err(e) => Err(e),
        };

        metrics::record_deletion(BACKEND, result.is_ok());
        match &result {
            Ok(()) => tracing::info!(pdf_id, "Document deleted"),
            Err(e) => tracing::warn!(pdf_id, error = %e, "Document deletion failed"),
        }
        result
    }

    async fn health_check(&self) -> StoreResult<()> {
        let exists = self
            .client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(|e| self.store_error(e))?;
        if !exists {
            return Err(StoreError::CollectionMissing {
                collection: self.collection.clone(),
            });
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}
