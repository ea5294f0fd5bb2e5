//! Rulebook document index handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};
use validator::Validate;

use super::validation_error;
use crate::AppState;
use ruleforge_common::{
    errors::{AppError, Result},
    models::Chunk,
};

#[derive(Debug, Deserialize, Validate)]
pub struct DocumentPath {
    #[validate(length(min = 1, max = 128))]
    pub game_id: String,
    #[validate(length(min = 1, max = 128))]
    pub pdf_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PdfPath {
    #[validate(length(min = 1, max = 128))]
    pub pdf_id: String,
}

/// Index request
#[derive(Debug, Deserialize, Validate)]
pub struct IndexChunksRequest {
    #[validate(length(max = 10000))]
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexChunksResponse {
    pub success: bool,
    pub indexed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteDocumentResponse {
    pub success: bool,
}

/// Upsert a document's chunks for one game
pub async fn index_chunks(
    State(state): State<AppState>,
    Path(path): Path<DocumentPath>,
    Json(request): Json<IndexChunksRequest>,
) -> Result<(StatusCode, Json<IndexChunksResponse>)> {
    path.validate().map_err(validation_error)?;
    request.validate().map_err(validation_error)?;

    let start = Instant::now();
    match state
        .store
        .index_chunks(&path.game_id, &path.pdf_id, &request.chunks)
        .await
    {
        Ok(indexed_count) => {
            info!(
                game_id = %path.game_id,
                pdf_id = %path.pdf_id,
                indexed_count,
                latency_ms = start.elapsed().as_millis() as u64,
                "Chunks indexed"
            );
            Ok((
                StatusCode::OK,
                Json(IndexChunksResponse {
                    success: true,
                    indexed_count,
                    error: None,
                }),
            ))
        }
        Err(e) => {
            let err = AppError::from(e);
            warn!(
                game_id = %path.game_id,
                pdf_id = %path.pdf_id,
                error = %err,
                "Chunk indexing failed"
            );
            Ok((
                err.status_code(),
                Json(IndexChunksResponse {
                    success: false,
                    indexed_count: 0,
                    error: Some(err.to_string()),
                }),
            ))
        }
    }
}

/// Remove a document from every game. Deleting an unknown document succeeds.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(path): Path<PdfPath>,
) -> Result<(StatusCode, Json<DeleteDocumentResponse>)> {
    path.validate().map_err(validation_error)?;

    match state.store.delete_document(&path.pdf_id).await {
        Ok(()) => {
            info!(pdf_id = %path.pdf_id, "Document deleted");
            Ok((StatusCode::OK, Json(DeleteDocumentResponse { success: true })))
        }
        Err(e) => {
            let err = AppError::from(e);
            warn!(pdf_id = %path.pdf_id, error = %err, "Document deletion failed");
            Ok((err.status_code(), Json(DeleteDocumentResponse { success: false })))
        }
    }
}
