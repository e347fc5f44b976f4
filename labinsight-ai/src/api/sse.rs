//! GET /events - analysis progress over Server-Sent Events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use labinsight_common::sse::create_event_sse_stream;
use std::convert::Infallible;

use crate::AppState;

pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_event_sse_stream("labinsight-ai", &state.event_bus)
}
