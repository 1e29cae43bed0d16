//! WebSocket stream of batch events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use convertino_core::scheduler::{BatchHandleState, JobEvent};
use convertino_core::{BatchEvent, BatchHandle};

use super::handlers::api_error;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

fn event_type(event: &BatchEvent) -> &'static str {
    match event {
        BatchEvent::Job(_) => "job",
        BatchEvent::Progress { .. } => "progress",
        BatchEvent::Finished { .. } => "finished",
    }
}

/// WebSocket upgrade handler for `/batches/{id}/events`.
pub async fn batch_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.scheduler().batch(&id).await {
        Some(handle) => ws
            .on_upgrade(move |socket| handle_socket(socket, handle))
            .into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("Batch not found: {}", id))
            .into_response(),
    }
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &BatchEvent,
) -> bool {
    WS_MESSAGES_SENT.with_label_values(&[event_type(event)]).inc();
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize BatchEvent: {}", e);
            true
        }
    }
}

/// Events a late client needs to rebuild a finished batch.
async fn replay(handle: &BatchHandle) -> Vec<BatchEvent> {
    let report = handle.snapshot().await;
    let mut events: Vec<BatchEvent> = report
        .jobs
        .iter()
        .map(|job| BatchEvent::Job(JobEvent::from_job(&report.batch_id, job)))
        .collect();
    events.push(report.progress_event());
    if let Some(outcome) = report.outcome {
        events.push(BatchEvent::Finished { outcome });
    }
    events
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, handle: BatchHandle) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = handle.subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(batch_id = %handle.id(), "WebSocket client connected");

    if handle.state() == BatchHandleState::Finished {
        for event in replay(&handle).await {
            if !send_event(&mut sender, &event).await {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
        WS_CONNECTIONS_ACTIVE.dec();
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let finished = matches!(event, BatchEvent::Finished { .. });
                    if !send_event(&mut sender, &event).await {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                    if finished {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} events", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Batch event channel closed");
                    break;
                }
            }
        }
    });

    // Client messages are ignored apart from close.
    let mut send_task = send_task;
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            message = receiver.next() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("WebSocket client closed");
                    send_task.abort();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    send_task.abort();
                    break;
                }
            },
        }
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!(batch_id = %handle.id(), "WebSocket client disconnected");
}
