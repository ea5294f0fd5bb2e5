//! Rulebook chunk and index point models

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A contiguous span of rulebook text, embedded by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub text: String,

    /// Precomputed embedding, same dimension as the collection
    pub embedding: Vec<f32>,

    /// 1-based page number in the source PDF
    pub page: u32,

    /// Character offset start in the extracted document text
    pub char_start: u32,

    /// Character offset end in the extracted document text
    pub char_end: u32,
}

/// Payload persisted next to every vector in the shared collection.
///
/// Field names are the filter keys used by the store (`gameId`, `pdfId`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    pub game_id: String,
    pub pdf_id: String,
    pub page: u32,
    pub char_start: u32,
    pub char_end: u32,
    pub text: String,
}

/// The store's persisted unit
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl IndexedPoint {
    /// Build the point for the `position`-th chunk of a document
    pub fn from_chunk(game_id: &str, pdf_id: &str, position: usize, chunk: &Chunk) -> Self {
        Self {
            id: Self::point_id(game_id, pdf_id, position),
            vector: chunk.embedding.clone(),
            payload: PointPayload {
                game_id: game_id.to_string(),
                pdf_id: pdf_id.to_string(),
                page: chunk.page,
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                text: chunk.text.clone(),
            },
        }
    }

    /// Deterministic point id for a chunk position within a game's document.
    ///
    /// Re-indexing the same document overwrites the same ids, which gives the
    /// store its upsert semantics. Stale positions beyond the new chunk count
    /// are left in place.
    ///
    /// Each id is length-prefixed so no two `(game_id, pdf_id)` pairs hash the
    /// same input, whatever characters they contain.
    pub fn point_id(game_id: &str, pdf_id: &str, position: usize) -> Uuid {
        let mut hasher = Sha256::new();
        for field in [game_id, pdf_id] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update((position as u64).to_le_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

/// Ranked hit from a game-filtered similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub text: String,
    pub pdf_id: String,
    pub page: u32,

    /// Cosine similarity; higher is more relevant
    pub score: f32,
}

impl SearchResult {
    pub fn from_payload(payload: PointPayload, score: f32) -> Self {
        Self {
            text: payload.text,
            pdf_id: payload.pdf_id,
            page: payload.page,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            embedding: vec![1.0, 0.0],
            page: 3,
            char_start: 10,
            char_end: 10 + text.len() as u32,
        }
    }

    #[test]
    fn test_point_id_is_stable_per_position() {
        let a = IndexedPoint::point_id("chess", "rules-1", 0);
        let b = IndexedPoint::point_id("chess", "rules-1", 0);
        let c = IndexedPoint::point_id("chess", "rules-1", 1);
        let d = IndexedPoint::point_id("chess", "rules-2", 0);
        let e = IndexedPoint::point_id("go", "rules-1", 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
    }

    #[test]
    fn test_point_id_separator_in_ids_does_not_collide() {
        assert_ne!(
            IndexedPoint::point_id("a/b", "c", 0),
            IndexedPoint::point_id("a", "b/c", 0)
        );
        assert_ne!(
            IndexedPoint::point_id("chess:0", "", 0),
            IndexedPoint::point_id("chess", ":0", 0)
        );
    }

    #[test]
    fn test_from_chunk_copies_provenance() {
        let point = IndexedPoint::from_chunk("chess", "rules-1", 2, &chunk("Castling moves the king"));

        assert_eq!(point.id, IndexedPoint::point_id("chess", "rules-1", 2));
        assert_eq!(point.payload.game_id, "chess");
        assert_eq!(point.payload.pdf_id, "rules-1");
        assert_eq!(point.payload.page, 3);
        assert_eq!(point.payload.char_start, 10);
        assert_eq!(point.vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_payload_uses_filter_key_names() {
        let point = IndexedPoint::from_chunk("chess", "rules-1", 0, &chunk("Pawns"));
        let json = serde_json::to_value(&point.payload).unwrap();

        assert_eq!(json["gameId"], "chess");
        assert_eq!(json["pdfId"], "rules-1");
        assert_eq!(json["charStart"], 10);
        assert!(json.get("game_id").is_none());
    }

    #[test]
    fn test_chunk_deserializes_from_ingestion_json() {
        let json = r#"{"text":"Roll two dice","embedding":[0.5,0.5],"page":1,"charStart":0,"charEnd":13}"#;
        let parsed: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.char_end, 13);
        assert_eq!(parsed.embedding.len(), 2);
    }
}
