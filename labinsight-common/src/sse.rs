//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementation for LabInsight services.

use crate::events::{EventBus, InsightEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Heartbeat interval for SSE connections
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert an event into an SSE frame (`event:` name + JSON data)
pub fn to_sse_event(event: &InsightEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Create an SSE stream forwarding every EventBus event
///
/// Sends a `ConnectionStatus` frame first, then forwards events with a
/// heartbeat comment every 15 seconds. Lagged subscribers skip the missed
/// events and keep streaming; the stream ends when the bus is dropped.
pub fn create_event_sse_stream(
    service_name: &'static str,
    event_bus: &EventBus,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            if let Some(frame) = to_sse_event(&event) {
                                yield Ok(frame);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("SSE: {} client lagged, skipped {} events", service_name, skipped);
                        }
                        Err(RecvError::Closed) => {
                            info!("SSE: {} event bus closed", service_name);
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
