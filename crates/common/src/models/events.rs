//! Streaming explain events
//!
//! Every event is `{type, data, timestamp}` on the wire. `data` is an
//! adjacently tagged union so each `type` has exactly one payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event of an explain stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl StreamingEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn state_update(message: impl Into<String>) -> Self {
        Self::new(EventPayload::StateUpdate {
            message: message.into(),
        })
    }

    pub fn error(code: StreamErrorCode, message: impl Into<String>) -> Self {
        Self::new(EventPayload::Error {
            error_message: message.into(),
            error_code: code,
        })
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Event payloads, one variant per event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    StateUpdate {
        message: String,
    },
    Citations {
        citations: Vec<Citation>,
    },
    Outline {
        outline: Outline,
    },
    ScriptChunk(ScriptChunk),
    Complete(CompletionSummary),
    #[serde(rename_all = "camelCase")]
    Error {
        error_message: String,
        error_code: StreamErrorCode,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::StateUpdate { .. } => EventType::StateUpdate,
            EventPayload::Citations { .. } => EventType::Citations,
            EventPayload::Outline { .. } => EventType::Outline,
            EventPayload::ScriptChunk(_) => EventType::ScriptChunk,
            EventPayload::Complete(_) => EventType::Complete,
            EventPayload::Error { .. } => EventType::Error,
        }
    }
}

/// Discriminant of an event, used for SSE event names and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    StateUpdate,
    Citations,
    Outline,
    ScriptChunk,
    Complete,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StateUpdate => "StateUpdate",
            EventType::Citations => "Citations",
            EventType::Outline => "Outline",
            EventType::ScriptChunk => "ScriptChunk",
            EventType::Complete => "Complete",
            EventType::Error => "Error",
        }
    }
}

/// User-facing failure codes carried by `Error` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamErrorCode {
    EmptyTopic,
    EmbeddingFailed,
    NoResults,
}

impl StreamErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamErrorCode::EmptyTopic => "EMPTY_TOPIC",
            StreamErrorCode::EmbeddingFailed => "EMBEDDING_FAILED",
            StreamErrorCode::NoResults => "NO_RESULTS",
        }
    }
}

/// A search result reformatted for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    /// `PDF:<pdfId>`
    pub source: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub main_topic: String,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptChunk {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk: String,
}

/// Final event of a successful stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub estimated_reading_time_minutes: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_update_wire_shape() {
        let event = StreamingEvent::state_update("Searching vector database...");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "StateUpdate");
        assert_eq!(json["data"]["message"], "Searching vector database...");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_error_wire_shape() {
        let event = StreamingEvent::error(StreamErrorCode::NoResults, "No relevant rules found");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["data"]["errorCode"], "NO_RESULTS");
        assert_eq!(json["data"]["errorMessage"], "No relevant rules found");
        assert_eq!(event.event_type(), EventType::Error);
    }

    #[test]
    fn test_script_chunk_and_complete_use_camel_case() {
        let chunk = StreamingEvent::new(EventPayload::ScriptChunk(ScriptChunk {
            chunk_index: 1,
            total_chunks: 3,
            chunk: "Each player".to_string(),
        }));
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["data"]["chunkIndex"], 1);
        assert_eq!(json["data"]["totalChunks"], 3);

        let complete = StreamingEvent::new(EventPayload::Complete(CompletionSummary {
            estimated_reading_time_minutes: 1,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            confidence: 0.5,
        }));
        let json = serde_json::to_value(&complete).unwrap();
        assert_eq!(json["data"]["estimatedReadingTimeMinutes"], 1);
        assert_eq!(json["data"]["totalTokens"], 0);
    }

    #[test]
    fn test_outline_and_citations_nesting() {
        let outline = StreamingEvent::new(EventPayload::Outline {
            outline: Outline {
                main_topic: "castling".to_string(),
                sections: vec!["The king moves two squares...".to_string()],
            },
        });
        let json = serde_json::to_value(&outline).unwrap();
        assert_eq!(json["data"]["outline"]["mainTopic"], "castling");
        assert_eq!(json["data"]["outline"]["sections"][0], "The king moves two squares...");

        let citations = StreamingEvent::new(EventPayload::Citations {
            citations: vec![Citation {
                text: "The king moves two squares".to_string(),
                source: "PDF:rules-1".to_string(),
                page: 4,
            }],
        });
        let json = serde_json::to_value(&citations).unwrap();
        assert_eq!(json["data"]["citations"][0]["source"], "PDF:rules-1");
        assert_eq!(json["data"]["citations"][0]["page"], 4);
    }

    #[test]
    fn test_event_type_names_match_wire_tags() {
        let event = StreamingEvent::state_update("x");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type().as_str());
        assert_eq!(StreamErrorCode::EmbeddingFailed.as_str(), "EMBEDDING_FAILED");
    }
}
