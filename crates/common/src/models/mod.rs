//! Domain models shared by the index, the orchestrator and the gateway

mod chunk;
mod events;

pub use chunk::{Chunk, IndexedPoint, PointPayload, SearchResult};
pub use events::{
    Citation, CompletionSummary, EventPayload, EventType, Outline, ScriptChunk, StreamErrorCode,
    StreamingEvent,
};
