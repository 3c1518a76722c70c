//! Topic backend trait definition
//!
//! Defines the interface for topic implementations (memory and Redis).
//! Supports two delivery semantics:
//! - Broadcast (Pub/Sub): fire-and-forget, all subscribers receive
//! - Stream: at-least-once, one consumer per message, acknowledgment required

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::TopicError;

/// Message received from a stream with its ID for acknowledgment
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Unique entry ID (Redis stream ID or memory sequence), monotonically
    /// increasing per stream
    pub id: String,
    /// Message payload (JSON)
    pub payload: Vec<u8>,
}

/// Subscription to a broadcast topic (Pub/Sub semantics)
pub struct BroadcastSubscription {
    /// Stream of received messages
    pub receiver: Pin<Box<dyn Stream<Item = Result<Vec<u8>, TopicError>> + Send>>,
}

/// Subscription to a stream topic (at-least-once semantics)
pub struct StreamSubscription {
    /// Stream of received messages with IDs
    pub receiver: Pin<Box<dyn Stream<Item = Result<StreamMessage, TopicError>> + Send>>,
}

/// Topic backend trait
///
/// # Topic Types
///
/// - **Broadcast topics** (Pub/Sub): `publish` / `subscribe`. Best-effort
///   delivery, all active subscribers receive each message. No persistence -
///   if no subscribers, messages are lost. Used for per-post push events and
///   alert notifications.
///
/// - **Stream topics**: `stream_publish` / `stream_subscribe` / `stream_ack`.
///   At-least-once delivery with acknowledgment. Entries persist until acked;
///   unacked entries are re-delivered after a consumer crash via claim.
///   Used for the incoming post stream.
#[async_trait]
pub trait TopicBackend: Send + Sync {
    // =========================================================================
    // Broadcast (Pub/Sub) - fire-and-forget, all subscribers receive
    // =========================================================================

    /// Publish message to broadcast topic (fire-and-forget)
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError>;

    /// Subscribe to broadcast topic
    ///
    /// Returns a stream of messages. Lagging subscribers may miss messages
    /// (bounded buffer overflow).
    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError>;

    // =========================================================================
    // Stream - at-least-once with acknowledgment
    // =========================================================================

    /// Publish message to stream topic, returning the new entry ID
    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, TopicError>;

    /// Subscribe to stream topic with consumer group
    ///
    /// Group creation is idempotent. Entries are distributed across consumers
    /// in the group; each is delivered to exactly one consumer until acked.
    ///
    /// # Arguments
    /// - `topic`: Stream name
    /// - `group`: Consumer group name (e.g., "sentiment_workers")
    /// - `consumer`: Unique consumer name (e.g., "{uuid}:{pid}")
    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<StreamSubscription, TopicError>;

    /// Acknowledge entry processing complete
    ///
    /// Removes the entry from the group's pending list. Must be called after
    /// successful processing (or for poison entries) to prevent re-delivery.
    async fn stream_ack(&self, topic: &str, group: &str, id: &str) -> Result<(), TopicError>;

    /// Claim pending entries that have been idle too long
    ///
    /// Recovery path for consumers that crashed without acknowledging.
    ///
    /// # Arguments
    /// - `min_idle_ms`: Minimum idle time before claiming (e.g., 60000)
    /// - `count`: Maximum entries to claim
    async fn stream_claim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TopicError>;

    /// Get stream statistics for monitoring
    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError>;

    // =========================================================================
    // Health and metadata
    // =========================================================================

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), TopicError>;

    /// Gracefully stop background resources (pub/sub bridges)
    async fn shutdown(&self);

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Total messages in the stream
    pub length: u64,
    /// Messages pending acknowledgment
    pub pending: u64,
    /// Number of consumers in the group
    pub consumers: u64,
    /// Oldest pending message age in milliseconds
    pub oldest_pending_ms: Option<u64>,
}
