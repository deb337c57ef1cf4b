//! Server-Sent Events stream for supervisor dashboards
//!
//! Streams every lifecycle event as JSON. Each subscriber reads from its
//! own bounded buffer; one that falls behind is disconnected rather than
//! ever slowing the engine.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

/// GET /events - SSE event stream
///
/// Streams events:
/// - `packet_received`
/// - `state_changed`
/// - `ai_completed`
/// - `ai_failed`
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        subscribers = state.event_bus.subscriber_count() + 1,
        "New SSE subscriber connected"
    );

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }

                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let event_type = event.event_type();
                            match serde_json::to_string(&event) {
                                Ok(event_json) => {
                                    debug!(event = event_type, call_id = event.call_id(), "Forwarding event");
                                    yield Ok(Event::default()
                                        .event(event_type)
                                        .data(event_json));
                                }
                                Err(e) => {
                                    warn!(event = event_type, error = %e, "Failed to serialize event");
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            // Buffer overflow: drop this subscriber, not the
                            // events
                            warn!(skipped, "SSE subscriber overflowed its buffer, disconnecting");
                            break;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
