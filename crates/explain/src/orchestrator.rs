//! Explain pipeline as a pull-driven state machine

use crate::outline::{build_citations, build_outline};
use crate::script::{compose_script, estimate_reading_minutes, split_script};
use crate::{ExplainError, ExplainOptions};
use futures::stream::{self, BoxStream, StreamExt};
use ruleforge_common::embeddings::{EmbeddingError, EmbeddingProvider};
use ruleforge_common::metrics;
use ruleforge_common::models::{
    CompletionSummary, EventPayload, ScriptChunk, SearchResult, StreamErrorCode, StreamingEvent,
};
use ruleforge_search::{StoreError, VectorStore};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MSG_EMBEDDING: &str = "Generating embeddings for topic...";
pub const MSG_SEARCHING: &str = "Searching vector database...";
pub const MSG_OUTLINE: &str = "Building outline...";
pub const MSG_SCRIPT: &str = "Generating explanation script...";

/// Lazily produced explain events
pub type EventStream = BoxStream<'static, Result<StreamingEvent, ExplainError>>;

#[derive(Debug, Clone)]
pub struct ExplainRequest {
    pub game_id: String,
    pub topic: String,
}

impl ExplainRequest {
    pub fn new(game_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            topic: topic.into(),
        }
    }
}

/// Explain service
///
/// Cheap to clone; every call to [`ExplainService::explain`] gets its own
/// independent pipeline and shares nothing mutable with other calls.
#[derive(Clone)]
pub struct ExplainService {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    options: ExplainOptions,
}

impl ExplainService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        options: ExplainOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    pub fn options(&self) -> &ExplainOptions {
        &self.options
    }

    /// Start an explain stream for `request`.
    ///
    /// Nothing runs until the stream is polled. Each poll computes exactly
    /// one event. Once `cancel` fires the stream yields a single
    /// `Err(ExplainError::Cancelled)` and ends. The stream only observes
    /// `cancel`; finishing or dropping it leaves the token untouched, so one
    /// token may serve many consecutive streams. Dropping the stream aborts
    /// any in-flight embedding or search call.
    pub fn explain(&self, request: ExplainRequest, cancel: CancellationToken) -> EventStream {
        let pipeline = Pipeline {
            embedder: Arc::clone(&self.embedder),
            store: Arc::clone(&self.store),
            options: self.options.clone(),
            request,
            cancel,
            stage: Stage::Validate,
            started: Instant::now(),
        };

        stream::unfold(pipeline, |mut pipeline| async move {
            let item = pipeline.next_item().await?;
            Some((item, pipeline))
        })
        .boxed()
    }
}

enum Stage {
    Validate,
    Embed,
    Search {
        embedding: Vec<f32>,
    },
    OutlineStatus {
        results: Vec<SearchResult>,
    },
    Outline {
        results: Vec<SearchResult>,
    },
    ScriptStatus {
        results: Vec<SearchResult>,
    },
    Script {
        pieces: VecDeque<ScriptChunk>,
        summary: CompletionSummary,
    },
    Done,
}

struct Pipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    options: ExplainOptions,
    request: ExplainRequest,
    cancel: CancellationToken,
    stage: Stage,
    started: Instant,
}

impl Pipeline {
    async fn next_item(&mut self) -> Option<Result<StreamingEvent, ExplainError>> {
        if matches!(self.stage, Stage::Done) {
            return None;
        }
        if self.cancel.is_cancelled() {
            return Some(Err(self.cancelled()));
        }

        let item = self.advance().await;
        if let Ok(event) = &item {
            metrics::record_explain_event(event.event_type().as_str());
        }
        Some(item)
    }

    async fn advance(&mut self) -> Result<StreamingEvent, ExplainError> {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Validate => Ok(self.validate()),
            Stage::Embed => self.embed().await,
            Stage::Search { embedding } => self.search(embedding).await,
            Stage::OutlineStatus { results } => {
                self.stage = Stage::Outline { results };
                Ok(StreamingEvent::state_update(MSG_OUTLINE))
            }
            Stage::Outline { results } => {
                let outline = build_outline(
                    &self.request.topic,
                    &results,
                    self.options.section_title_max_chars,
                );
                self.stage = Stage::ScriptStatus { results };
                Ok(StreamingEvent::new(EventPayload::Outline { outline }))
            }
            Stage::ScriptStatus { results } => {
                self.stage = self.prepare_script(&results);
                Ok(StreamingEvent::state_update(MSG_SCRIPT))
            }
            Stage::Script {
                mut pieces,
                summary,
            } => match pieces.pop_front() {
                Some(piece) => {
                    self.stage = Stage::Script { pieces, summary };
                    Ok(StreamingEvent::new(EventPayload::ScriptChunk(piece)))
                }
                None => {
                    info!(
                        game_id = %self.request.game_id,
                        reading_minutes = summary.estimated_reading_time_minutes,
                        confidence = summary.confidence,
                        "Explain stream complete"
                    );
                    self.finish("complete");
                    Ok(StreamingEvent::new(EventPayload::Complete(summary)))
                }
            },
            // Guarded in next_item
            Stage::Done => Err(ExplainError::Cancelled),
        }
    }

    fn validate(&mut self) -> StreamingEvent {
        if self.request.topic.trim().is_empty() {
            warn!(game_id = %self.request.game_id, "Explain rejected: empty topic");
            self.finish("empty_topic");
            return StreamingEvent::error(StreamErrorCode::EmptyTopic, "Topic cannot be empty");
        }

        debug!(game_id = %self.request.game_id, topic = %self.request.topic, "Explain started");
        self.stage = Stage::Embed;
        StreamingEvent::state_update(MSG_EMBEDDING)
    }

    async fn embed(&mut self) -> Result<StreamingEvent, ExplainError> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.embedder.embed_one(&self.request.topic) => Some(result),
        };
        let Some(result) = result else {
            return Err(self.cancelled());
        };

        match result {
            Ok(embedding) if !embedding.is_empty() => {
                self.stage = Stage::Search { embedding };
                Ok(StreamingEvent::state_update(MSG_SEARCHING))
            }
            Ok(_) => {
                warn!(game_id = %self.request.game_id, "Embedding provider returned an empty vector");
                self.finish("embedding_failed");
                Ok(StreamingEvent::error(
                    StreamErrorCode::EmbeddingFailed,
                    "Failed to generate embeddings: provider returned no vector",
                ))
            }
            Err(e @ EmbeddingError::Configuration { .. }) => {
                self.finish("fault");
                Err(ExplainError::Embedding(e))
            }
            Err(e) => {
                warn!(game_id = %self.request.game_id, error = %e, "Topic embedding failed");
                self.finish("embedding_failed");
                Ok(StreamingEvent::error(
                    StreamErrorCode::EmbeddingFailed,
                    format!("Failed to generate embeddings: {}", e),
                ))
            }
        }
    }

    async fn search(&mut self, embedding: Vec<f32>) -> Result<StreamingEvent, ExplainError> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.store.search(&self.request.game_id, &embedding, self.options.top_k) => {
                Some(result)
            }
        };
        let Some(result) = result else {
            return Err(self.cancelled());
        };

        let results: Vec<SearchResult> = match result {
            Ok(results) => results
                .into_iter()
                .filter(|result| !result.text.trim().is_empty())
                .collect(),
            Err(e @ (StoreError::DimensionMismatch { .. } | StoreError::Configuration { .. })) => {
                self.finish("fault");
                return Err(ExplainError::Store(e));
            }
            Err(e) => {
                // Outage and content gap share one code; the message tells them apart
                warn!(game_id = %self.request.game_id, error = %e, "Vector search failed");
                self.finish("search_failed");
                return Ok(StreamingEvent::error(
                    StreamErrorCode::NoResults,
                    format!("Vector search unavailable: {}", e),
                ));
            }
        };

        if results.is_empty() {
            info!(game_id = %self.request.game_id, "No rulebook passages matched topic");
            self.finish("no_results");
            return Ok(StreamingEvent::error(
                StreamErrorCode::NoResults,
                "No relevant rulebook content found for this topic",
            ));
        }

        debug!(game_id = %self.request.game_id, results = results.len(), "Search complete");
        let citations = build_citations(&results);
        self.stage = Stage::OutlineStatus { results };
        Ok(StreamingEvent::new(EventPayload::Citations { citations }))
    }

    fn prepare_script(&self, results: &[SearchResult]) -> Stage {
        let script = compose_script(results);
        let pieces: VecDeque<ScriptChunk> =
            split_script(&script, self.options.script_chunk_size).into();
        let confidence = results
            .iter()
            .map(|result| result.score)
            .fold(f32::NEG_INFINITY, f32::max);

        Stage::Script {
            pieces,
            summary: CompletionSummary {
                estimated_reading_time_minutes: estimate_reading_minutes(
                    &script,
                    self.options.words_per_minute,
                ),
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
                confidence,
            },
        }
    }

    fn cancelled(&mut self) -> ExplainError {
        debug!(game_id = %self.request.game_id, "Explain stream cancelled");
        self.finish("cancelled");
        ExplainError::Cancelled
    }

    fn finish(&mut self, outcome: &'static str) {
        self.stage = Stage::Done;
        metrics::record_explain(self.started.elapsed().as_secs_f64(), outcome);
    }
}
