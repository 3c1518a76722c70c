//! WebSocket push channel
//!
//! `/ws/sentiment` subscribers receive a hello frame, then a multiplex of
//! per-post `new_post` events and periodic `metrics_update` rollups. Each
//! connection is serviced by two producer tasks feeding a per-connection
//! queue; a send failure tears down only that connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::super::ApiState;
use crate::core::constants::{CHANNEL_UPDATES, CONTENT_PREVIEW_CHARS, METRICS_INTERVAL_SECS};
use crate::data::topics::TopicError;
use crate::data::types::{MetricsFrame, PostEvent};

// ============================================================================
// Connection registry
// ============================================================================

/// Registry of live push connections
///
/// Process-scoped mutable state, owned by the gateway for the lifetime of
/// the process and mutated only on connect/disconnect. Each entry holds the
/// connection's outbound queue.
pub struct StreamGateway {
    connections: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl Default for StreamGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamGateway {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection's outbound queue, returning its id
    fn register(&self, tx: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().insert(id, tx);
        id
    }

    /// Remove a connection; other subscribers are unaffected
    fn deregister(&self, id: u64) {
        self.connections.lock().remove(&id);
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

// ============================================================================
// Frames
// ============================================================================

fn connected_frame(now: DateTime<Utc>) -> String {
    serde_json::json!({
        "type": "connected",
        "message": "Connected to sentiment stream",
        "timestamp": now,
    })
    .to_string()
}

fn new_post_frame(event: &PostEvent) -> String {
    serde_json::json!({
        "type": "new_post",
        "data": {
            "post_id": event.post_id,
            "content": truncate_content(&event.content),
            "source": event.source,
            "sentiment_label": event.sentiment_label,
            "confidence_score": event.confidence_score,
            "emotion": event.emotion,
            "timestamp": event.timestamp,
        },
    })
    .to_string()
}

fn metrics_frame(metrics: &MetricsFrame, now: DateTime<Utc>) -> String {
    serde_json::json!({
        "type": "metrics_update",
        "data": metrics,
        "timestamp": now,
    })
    .to_string()
}

/// Truncate content to the preview length on a character boundary
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= CONTENT_PREVIEW_CHARS {
        content.to_string()
    } else {
        content.chars().take(CONTENT_PREVIEW_CHARS).collect()
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Upgrade to a WebSocket push connection
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sink, mut receiver) = socket.split();

    // Per-connection outbound queue; both producers feed it and the send
    // pump drains it into the socket
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = state.gateway.register(tx.clone());
    tracing::debug!(
        conn_id,
        connections = state.gateway.connection_count(),
        "Push subscriber connected"
    );

    let _ = tx.send(connected_frame(Utc::now()));

    // Updates producer: forward each published post event as a new_post frame
    let subscription = state
        .topics
        .broadcast_topic::<PostEvent>(CHANNEL_UPDATES)
        .subscribe()
        .await;
    let updates_tx = tx.clone();
    let updates_task = tokio::spawn(async move {
        let mut subscriber = match subscription {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to subscribe to post events");
                return;
            }
        };
        loop {
            match subscriber.recv().await {
                Ok(event) => {
                    if updates_tx.send(new_post_frame(&event)).is_err() {
                        break;
                    }
                }
                Err(TopicError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "Push subscriber lagged behind post events");
                }
                Err(_) => break,
            }
        }
    });

    // Metrics producer: one rollup frame every METRICS_INTERVAL_SECS
    let metrics_tx = tx.clone();
    let aggregator = state.aggregator.clone();
    let metrics_task = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(METRICS_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick
        interval.tick().await;
        loop {
            interval.tick().await;
            match aggregator.realtime_metrics().await {
                Ok(metrics) => {
                    if metrics_tx.send(metrics_frame(&metrics, Utc::now())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compute metrics frame");
                }
            }
        }
    });

    // Send pump: queue → socket; a send error ends the connection
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Consume incoming client messages (pings, close frames)
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    // Wait for disconnect, send failure, or server shutdown
    let mut shutdown_rx = state.shutdown_rx.clone();
    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
        _ = shutdown_rx.wait_for(|&v| v) => {}
    }

    // The producer tasks for this connection are cancelled and the
    // subscription dropped with them
    updates_task.abort();
    metrics_task.abort();
    send_task.abort();
    recv_task.abort();
    let _ = updates_task.await;
    let _ = metrics_task.await;

    state.gateway.deregister(conn_id);
    tracing::debug!(
        conn_id,
        connections = state.gateway.connection_count(),
        "Push subscriber disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{Emotion, SentimentCounts, SentimentLabel};

    fn event(content: &str) -> PostEvent {
        PostEvent {
            post_id: "p1".to_string(),
            source: "twitter".to_string(),
            content: content.to_string(),
            sentiment_label: SentimentLabel::Positive,
            confidence_score: 0.95,
            emotion: Some(Emotion::Joy),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_truncate_content_short() {
        assert_eq!(truncate_content("hello"), "hello");
    }

    #[test]
    fn test_truncate_content_long() {
        let long = "x".repeat(250);
        let truncated = truncate_content(&long);
        assert_eq!(truncated.chars().count(), CONTENT_PREVIEW_CHARS);
    }

    #[test]
    fn test_truncate_content_multibyte() {
        let long = "é".repeat(150);
        let truncated = truncate_content(&long);
        assert_eq!(truncated.chars().count(), CONTENT_PREVIEW_CHARS);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_connected_frame_shape() {
        let frame: serde_json::Value =
            serde_json::from_str(&connected_frame(Utc::now())).unwrap();
        assert_eq!(frame["type"], "connected");
        assert_eq!(frame["message"], "Connected to sentiment stream");
        assert!(frame["timestamp"].is_string());
    }

    #[test]
    fn test_new_post_frame_shape() {
        let frame: serde_json::Value =
            serde_json::from_str(&new_post_frame(&event("I love it"))).unwrap();
        assert_eq!(frame["type"], "new_post");
        assert_eq!(frame["data"]["post_id"], "p1");
        assert_eq!(frame["data"]["sentiment_label"], "positive");
        assert_eq!(frame["data"]["emotion"], "joy");
        assert_eq!(frame["data"]["confidence_score"], 0.95);
    }

    #[test]
    fn test_new_post_frame_truncates_content() {
        let frame: serde_json::Value =
            serde_json::from_str(&new_post_frame(&event(&"y".repeat(300)))).unwrap();
        let content = frame["data"]["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), CONTENT_PREVIEW_CHARS);
    }

    #[test]
    fn test_metrics_frame_shape() {
        let metrics = MetricsFrame {
            last_minute: SentimentCounts::new(1, 0, 0),
            last_hour: SentimentCounts::new(5, 3, 2),
            last_24_hours: SentimentCounts::new(50, 30, 20),
        };
        let frame: serde_json::Value =
            serde_json::from_str(&metrics_frame(&metrics, Utc::now())).unwrap();
        assert_eq!(frame["type"], "metrics_update");
        assert_eq!(frame["data"]["last_minute"]["total"], 1);
        assert_eq!(frame["data"]["last_hour"]["positive"], 5);
        assert_eq!(frame["data"]["last_24_hours"]["total"], 100);
    }

    #[test]
    fn test_gateway_register_deregister() {
        let gateway = StreamGateway::new();
        assert_eq!(gateway.connection_count(), 0);

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let id1 = gateway.register(tx1);
        let id2 = gateway.register(tx2);
        assert_ne!(id1, id2);
        assert_eq!(gateway.connection_count(), 2);

        gateway.deregister(id1);
        assert_eq!(gateway.connection_count(), 1);

        // Deregistering twice is harmless
        gateway.deregister(id1);
        assert_eq!(gateway.connection_count(), 1);
    }
}
