//! Distributed topic system
//!
//! Provides pub/sub and stream messaging with pluggable backends:
//! - In-memory (default) - local-only, for development and single-process
//! - Redis (optional) - distributed, for multi-machine deployments
//!
//! ## Topic Types
//!
//! - **Broadcast topics** (`BroadcastTopic`): Fire-and-forget, all
//!   subscribers receive. Used for per-post push events and alert
//!   notifications. No persistence.
//!
//! - **Stream topics** (`StreamTopic`): At-least-once delivery with
//!   acknowledgment. Used for the incoming post stream. Entries persist
//!   until acknowledged.
//!
//! ## Configuration
//!
//! Topics follow cache backend configuration:
//! - `CACHE_BACKEND=memory` → in-memory topics
//! - `CACHE_BACKEND=redis` → Redis Streams + Pub/Sub

mod backend;
mod error;
mod memory;
mod pubsub;
mod redis;

use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::{
    BroadcastSubscription, StreamMessage, StreamStats, StreamSubscription, TopicBackend,
};
pub use error::TopicError;
use memory::MemoryTopicBackend;

use crate::core::config::{CacheBackendType, CacheConfig};

// ============================================================================
// TOPIC SERVICE
// ============================================================================

/// Central topic service - hands out typed stream and broadcast topics
/// backed by the configured backend.
pub struct TopicService {
    backend: Arc<dyn TopicBackend>,
}

impl TopicService {
    /// Create a new topic service with in-memory backend
    pub fn new() -> Self {
        Self {
            backend: Arc::new(MemoryTopicBackend::new()),
        }
    }

    /// Create from cache configuration
    pub async fn from_cache_config(cache_config: &CacheConfig) -> Result<Self, TopicError> {
        let backend: Arc<dyn TopicBackend> = match cache_config.backend {
            CacheBackendType::Memory => Arc::new(MemoryTopicBackend::new()),
            CacheBackendType::Redis => {
                let url = cache_config.redis_url.as_ref().ok_or_else(|| {
                    TopicError::Config("redis_url required for Redis backend".into())
                })?;
                Arc::new(redis::RedisTopicBackend::new(url).await?)
            }
        };

        Ok(Self { backend })
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Create a stream topic for at-least-once delivery
    ///
    /// Use for data that must not be lost (the post stream).
    /// Entries persist until acknowledged.
    pub fn stream_topic<T>(&self, name: &str) -> StreamTopic<T>
    where
        T: Serialize + DeserializeOwned,
    {
        StreamTopic {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
            _phantom: PhantomData,
        }
    }

    /// Create a broadcast topic for fire-and-forget delivery
    ///
    /// Use for ephemeral notifications (post events, alerts).
    /// Messages are lost if no subscribers or subscriber lags.
    pub fn broadcast_topic<T>(&self, name: &str) -> BroadcastTopic<T>
    where
        T: Serialize + DeserializeOwned,
    {
        BroadcastTopic {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
            _phantom: PhantomData,
        }
    }

    /// Get stream statistics for monitoring
    pub async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        self.backend.stream_stats(topic, group).await
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), TopicError> {
        self.backend.health_check().await
    }

    /// Gracefully shutdown the backend (stops Redis pub/sub bridges)
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

impl Default for TopicService {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// STREAM TOPIC (at-least-once)
// ============================================================================

/// Stream topic for at-least-once delivery
///
/// Uses Redis Streams when the Redis backend is configured, or an in-memory
/// simulation for local development and tests.
pub struct StreamTopic<T>
where
    T: Serialize + DeserializeOwned,
{
    name: String,
    backend: Arc<dyn TopicBackend>,
    _phantom: PhantomData<T>,
}

impl<T> StreamTopic<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Publish a message to the stream as JSON
    ///
    /// Returns the entry ID for tracking.
    pub async fn publish(&self, msg: &T) -> Result<String, TopicError> {
        let payload =
            serde_json::to_vec(msg).map_err(|e| TopicError::Serialization(e.to_string()))?;
        self.backend.stream_publish(&self.name, &payload).await
    }

    /// Subscribe to the stream with a consumer group
    ///
    /// Entries are distributed across consumers in the group. Call
    /// `acker().ack()` after processing each entry.
    pub async fn subscribe(
        &self,
        group: &str,
        consumer: &str,
    ) -> Result<StreamTopicSubscriber<T>, TopicError> {
        let subscription = self
            .backend
            .stream_subscribe(&self.name, group, consumer)
            .await?;
        Ok(StreamTopicSubscriber {
            name: self.name.clone(),
            group: group.to_string(),
            backend: Arc::clone(&self.backend),
            subscription,
            _phantom: PhantomData,
        })
    }

    /// Get the topic name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Acker for acknowledging stream entries (Send + Sync)
#[derive(Clone)]
pub struct StreamAcker {
    name: String,
    group: String,
    backend: Arc<dyn TopicBackend>,
}

impl StreamAcker {
    /// Acknowledge entry processing complete
    pub async fn ack(&self, id: &str) -> Result<(), TopicError> {
        self.backend.stream_ack(&self.name, &self.group, id).await
    }
}

/// Claimer for claiming stuck entries from other consumers (Send + Sync)
#[derive(Clone)]
pub struct StreamClaimer {
    name: String,
    group: String,
    backend: Arc<dyn TopicBackend>,
}

impl StreamClaimer {
    /// Claim stuck entries from other consumers
    ///
    /// Returns raw entries that have been idle longer than `min_idle_ms`.
    /// The caller decodes and processes them, then acknowledges via
    /// [`StreamAcker::ack`].
    pub async fn claim(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TopicError> {
        self.backend
            .stream_claim(&self.name, &self.group, consumer, min_idle_ms, count)
            .await
    }
}

/// Subscriber to a stream topic
///
/// Receives raw entries; decode with [`StreamTopicSubscriber::decode`] so
/// that malformed payloads keep their entry ID and can still be acked as
/// poison instead of being re-delivered forever.
pub struct StreamTopicSubscriber<T>
where
    T: Serialize + DeserializeOwned,
{
    name: String,
    group: String,
    backend: Arc<dyn TopicBackend>,
    subscription: StreamSubscription,
    _phantom: PhantomData<T>,
}

impl<T> StreamTopicSubscriber<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Receive the next raw entry
    pub async fn recv(&mut self) -> Result<StreamMessage, TopicError> {
        if let Some(result) = self.subscription.receiver.next().await {
            result
        } else {
            Err(TopicError::ChannelClosed)
        }
    }

    /// Decode an entry payload into the topic's message type
    pub fn decode(&self, msg: &StreamMessage) -> Result<T, TopicError> {
        serde_json::from_slice(&msg.payload)
            .map_err(|e| TopicError::Serialization(e.to_string()))
    }

    /// Get an acker for acknowledging entries (Send + Sync)
    pub fn acker(&self) -> StreamAcker {
        StreamAcker {
            name: self.name.clone(),
            group: self.group.clone(),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Get a claimer for claiming stuck entries (Send + Sync)
    pub fn claimer(&self) -> StreamClaimer {
        StreamClaimer {
            name: self.name.clone(),
            group: self.group.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

// ============================================================================
// BROADCAST TOPIC (fire-and-forget)
// ============================================================================

/// Broadcast topic for fire-and-forget delivery
///
/// Uses Redis Pub/Sub when the Redis backend is configured, or in-memory
/// broadcast for local development. Payloads are JSON.
pub struct BroadcastTopic<T>
where
    T: Serialize + DeserializeOwned,
{
    name: String,
    backend: Arc<dyn TopicBackend>,
    _phantom: PhantomData<T>,
}

impl<T> BroadcastTopic<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Publish a message (fire-and-forget)
    pub async fn publish(&self, msg: &T) -> Result<(), TopicError> {
        let payload =
            serde_json::to_vec(msg).map_err(|e| TopicError::Serialization(e.to_string()))?;
        self.backend.publish(&self.name, &payload).await
    }

    /// Subscribe to broadcast messages
    pub async fn subscribe(&self) -> Result<BroadcastTopicSubscriber<T>, TopicError> {
        let subscription = self.backend.subscribe(&self.name).await?;
        Ok(BroadcastTopicSubscriber {
            subscription,
            _phantom: PhantomData,
        })
    }

    /// Get the topic name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Subscriber to a broadcast topic
pub struct BroadcastTopicSubscriber<T>
where
    T: Serialize + DeserializeOwned,
{
    subscription: BroadcastSubscription,
    _phantom: PhantomData<T>,
}

impl<T> BroadcastTopicSubscriber<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Receive the next message
    pub async fn recv(&mut self) -> Result<T, TopicError> {
        if let Some(result) = self.subscription.receiver.next().await {
            let payload = result?;
            let decoded: T = serde_json::from_slice(&payload)
                .map_err(|e| TopicError::Serialization(e.to_string()))?;
            Ok(decoded)
        } else {
            Err(TopicError::ChannelClosed)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMessage {
        data: String,
    }

    fn msg(data: &str) -> TestMessage {
        TestMessage {
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_round_trip() {
        let service = TopicService::new();
        let topic = service.broadcast_topic::<TestMessage>("updates");
        let mut subscriber = topic.subscribe().await.unwrap();

        topic.publish(&msg("hello")).await.unwrap();

        let received = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            subscriber.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(received.data, "hello");
    }

    #[tokio::test]
    async fn test_broadcast_multiple_subscribers_receive_same_message() {
        let service = TopicService::new();
        let topic = service.broadcast_topic::<TestMessage>("updates");
        let mut sub1 = topic.subscribe().await.unwrap();
        let mut sub2 = topic.subscribe().await.unwrap();

        topic.publish(&msg("fanout")).await.unwrap();

        for sub in [&mut sub1, &mut sub2] {
            let received =
                tokio::time::timeout(std::time::Duration::from_millis(200), sub.recv())
                    .await
                    .unwrap()
                    .unwrap();
            assert_eq!(received.data, "fanout");
        }
    }

    #[tokio::test]
    async fn test_stream_publish_decode_ack() {
        let service = TopicService::new();
        let topic = service.stream_topic::<TestMessage>("posts");

        let id = topic.publish(&msg("entry")).await.unwrap();

        let mut subscriber = topic.subscribe("workers", "w1").await.unwrap();
        let raw = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            subscriber.recv(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(raw.id, id);
        let decoded = subscriber.decode(&raw).unwrap();
        assert_eq!(decoded.data, "entry");

        subscriber.acker().ack(&raw.id).await.unwrap();
        let stats = service.stream_stats("posts", "workers").await.unwrap();
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_stream_decode_failure_keeps_entry_id() {
        let service = TopicService::new();

        // Publish raw garbage through a string-typed topic
        let raw_topic = service.stream_topic::<String>("posts");
        raw_topic.publish(&"not an object".to_string()).await.unwrap();

        let typed_topic = service.stream_topic::<TestMessage>("posts");
        let mut subscriber = typed_topic.subscribe("workers", "w1").await.unwrap();

        let raw = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            subscriber.recv(),
        )
        .await
        .unwrap()
        .unwrap();

        // Decode fails but the entry ID is still usable for a poison ack
        assert!(subscriber.decode(&raw).is_err());
        subscriber.acker().ack(&raw.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_name() {
        let service = TopicService::new();
        assert_eq!(service.backend_name(), "memory");
    }
}
