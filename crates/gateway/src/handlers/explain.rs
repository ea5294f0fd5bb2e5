//! Explain streaming handler
//!
//! Each pipeline event becomes one SSE message whose `event` name is the
//! event type and whose `data` is the JSON event. Cancellation and faults end
//! the stream without a further message.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{future, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, error, info};
use validator::Validate;

use super::validation_error;
use crate::AppState;
use ruleforge_common::{errors::Result, models::StreamingEvent};
use ruleforge_explain::{ExplainError, ExplainRequest};

#[derive(Debug, Deserialize, Validate)]
pub struct GamePath {
    #[validate(length(min = 1, max = 128))]
    pub game_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExplainQuery {
    /// Blank topics are answered in-stream with `EMPTY_TOPIC`
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub topic: String,
}

/// Stream an explanation for a topic
pub async fn explain(
    State(state): State<AppState>,
    Path(path): Path<GamePath>,
    Query(query): Query<ExplainQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    path.validate().map_err(validation_error)?;
    query.validate().map_err(validation_error)?;

    info!(game_id = %path.game_id, "Explain stream opened");

    let game_id = path.game_id.clone();
    let events = state.explain.explain(
        ExplainRequest::new(path.game_id, query.topic),
        state.shutdown.child_token(),
    );

    let stream = events.filter_map(move |item| {
        let message = match item {
            Ok(event) => Some(Ok(sse_event(&event))),
            Err(ExplainError::Cancelled) => {
                debug!(game_id = %game_id, "Explain stream cancelled");
                None
            }
            Err(e) => {
                error!(game_id = %game_id, error = %e, "Explain stream failed");
                None
            }
        };
        future::ready(message)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}

fn sse_event(event: &StreamingEvent) -> Event {
    match Event::default()
        .event(event.event_type().as_str())
        .json_data(event)
    {
        Ok(message) => message,
        Err(e) => {
            error!(error = %e, "Failed to serialize explain event");
            Event::default().comment("unserializable event")
        }
    }
}
