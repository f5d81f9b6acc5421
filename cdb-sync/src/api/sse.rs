//! Server-Sent Events stream of bridge notifications
//!
//! GET /events streams imports, rejections and sync-back failures as they
//! happen.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use cdb_common::events::BridgeEvent;
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

fn event_name(event: &BridgeEvent) -> &'static str {
    match event {
        BridgeEvent::RecordImported { .. } => "RecordImported",
        BridgeEvent::RecordRejected { .. } => "RecordRejected",
        BridgeEvent::SyncBackFailed { .. } => "SyncBackFailed",
    }
}

/// GET /events
pub async fn bridge_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to bridge events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event_name(&event);
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: Broadcasting bridge event: {}", name);
                            yield Ok(Event::default().event(name).data(json));
                        }
                        Err(e) => warn!("SSE: Failed to serialize event {}: {}", name, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: Client lagged behind, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
