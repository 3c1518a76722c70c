//! In-memory topic backend
//!
//! Provides local-only topic functionality:
//! - Broadcast: tokio::broadcast channels (fire-and-forget)
//! - Stream: VecDeque with pending tracking (simulated consumer groups)
//!
//! ## Limitations
//!
//! Suitable for local development, single-process deployments, and tests:
//! - Process crash = all entries lost (no persistence)
//! - No cross-process coordination
//!
//! Production deployments use the Redis backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Notify, broadcast};

use super::backend::{
    BroadcastSubscription, StreamMessage, StreamStats, StreamSubscription, TopicBackend,
};
use super::error::TopicError;

/// Default broadcast channel capacity
const DEFAULT_BROADCAST_CAPACITY: usize = 10_000;

/// Default stream max length (approximate, trimmed on publish)
const DEFAULT_STREAM_MAX_LEN: usize = 100_000;

/// Entry stored in a memory stream
#[derive(Clone)]
struct StreamEntry {
    id: u64,
    payload: Vec<u8>,
}

/// Consumer group state for a stream
#[derive(Clone, Default)]
struct ConsumerGroup {
    /// Last delivered ID for each consumer
    last_delivered: HashMap<String, u64>,
    /// Pending entries: entry_id -> (consumer, delivery_time)
    pending: HashMap<u64, (String, Instant)>,
}

/// Stream state
#[derive(Clone)]
struct StreamState {
    messages: VecDeque<StreamEntry>,
    groups: HashMap<String, ConsumerGroup>,
    next_id: u64,
    max_len: usize,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            messages: VecDeque::new(),
            groups: HashMap::new(),
            next_id: 1,
            max_len: DEFAULT_STREAM_MAX_LEN,
        }
    }
}

/// Shared state for memory backend
struct SharedState {
    /// Broadcast channels by topic name
    broadcast_channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    /// Stream state by topic name
    streams: RwLock<HashMap<String, StreamState>>,
    /// Per-stream notifiers for immediate subscriber wakeup (avoids polling)
    stream_notifiers: RwLock<HashMap<String, Arc<Notify>>>,
    /// Channel capacity for new broadcast topics
    broadcast_capacity: usize,
}

/// In-memory topic backend
pub struct MemoryTopicBackend {
    state: Arc<SharedState>,
}

impl Clone for MemoryTopicBackend {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MemoryTopicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTopicBackend {
    /// Create a new in-memory topic backend
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState {
                broadcast_channels: RwLock::new(HashMap::new()),
                streams: RwLock::new(HashMap::new()),
                stream_notifiers: RwLock::new(HashMap::new()),
                broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            }),
        }
    }

    /// Get or create a broadcast channel
    fn get_or_create_broadcast(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let channels = self.state.broadcast_channels.read();
        if let Some(sender) = channels.get(topic) {
            return sender.clone();
        }
        drop(channels);

        let mut channels = self.state.broadcast_channels.write();
        // Double-check after acquiring write lock
        if let Some(sender) = channels.get(topic) {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(self.state.broadcast_capacity);
        channels.insert(topic.to_string(), sender.clone());
        sender
    }

    /// Trim stream to max length (approximately)
    fn trim_stream(stream: &mut StreamState) {
        while stream.messages.len() > stream.max_len {
            if let Some(entry) = stream.messages.pop_front() {
                for group in stream.groups.values_mut() {
                    group.pending.remove(&entry.id);
                }
            }
        }
    }

    /// Get or create a Notify for a stream topic
    fn get_or_create_notifier(&self, topic: &str) -> Arc<Notify> {
        {
            let notifiers = self.state.stream_notifiers.read();
            if let Some(n) = notifiers.get(topic) {
                return Arc::clone(n);
            }
        }
        let mut notifiers = self.state.stream_notifiers.write();
        if let Some(n) = notifiers.get(topic) {
            return Arc::clone(n);
        }
        let n = Arc::new(Notify::new());
        notifiers.insert(topic.to_string(), Arc::clone(&n));
        n
    }
}

#[async_trait]
impl TopicBackend for MemoryTopicBackend {
    // =========================================================================
    // Broadcast
    // =========================================================================

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError> {
        let sender = self.get_or_create_broadcast(topic);
        // Ignore send errors - means no active subscribers
        let _ = sender.send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError> {
        let sender = self.get_or_create_broadcast(topic);
        let mut receiver = sender.subscribe();

        let stream = stream! {
            loop {
                match receiver.recv().await {
                    Ok(payload) => yield Ok(payload),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        yield Err(TopicError::Lagged(n));
                    }
                }
            }
        };

        Ok(BroadcastSubscription {
            receiver: Box::pin(stream),
        })
    }

    // =========================================================================
    // Stream
    // =========================================================================

    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, TopicError> {
        let id = {
            let mut streams = self.state.streams.write();
            let stream = streams.entry(topic.to_string()).or_default();

            let id = stream.next_id;
            stream.next_id += 1;

            stream.messages.push_back(StreamEntry {
                id,
                payload: payload.to_vec(),
            });

            Self::trim_stream(stream);
            id
        };

        // Wake subscriber immediately (no polling delay)
        self.get_or_create_notifier(topic).notify_one();

        Ok(id.to_string())
    }

    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<StreamSubscription, TopicError> {
        // Ensure consumer group exists (idempotent)
        {
            let mut streams = self.state.streams.write();
            let stream = streams.entry(topic.to_string()).or_default();
            stream.groups.entry(group.to_string()).or_default();
        }

        let topic = topic.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();
        let state = Arc::clone(&self.state);
        let notifier = self.get_or_create_notifier(&topic);

        let stream = stream! {
            let mut last_seen: u64 = 0;

            // Resume from the consumer's last delivered position
            {
                let streams = state.streams.read();
                if let Some(stream_state) = streams.get(&topic)
                    && let Some(cg) = stream_state.groups.get(&group)
                    && let Some(&last) = cg.last_delivered.get(&consumer)
                {
                    last_seen = last;
                }
            }

            loop {
                // Check for new entries - scope the lock to avoid holding across await
                let (maybe_msg, stream_exists) = {
                    let mut streams = state.streams.write();
                    match streams.get_mut(&topic) {
                        None => (None, false),
                        Some(stream_state) => {
                            let cg = stream_state.groups.entry(group.clone()).or_default();

                            // Find next undelivered entry for this consumer
                            let mut found = None;
                            for entry in &stream_state.messages {
                                if entry.id > last_seen && !cg.pending.contains_key(&entry.id) {
                                    found = Some(entry.clone());
                                    break;
                                }
                            }

                            let msg = if let Some(entry) = found {
                                cg.pending.insert(entry.id, (consumer.clone(), Instant::now()));
                                cg.last_delivered.insert(consumer.clone(), entry.id);
                                last_seen = entry.id;
                                Some(StreamMessage {
                                    id: entry.id.to_string(),
                                    payload: entry.payload,
                                })
                            } else {
                                None
                            };
                            (msg, true)
                        }
                    }
                };

                if !stream_exists {
                    // Stream doesn't exist yet, wait for publish to create it
                    notifier.notified().await;
                    continue;
                }

                if let Some(msg) = maybe_msg {
                    yield Ok(msg);
                } else {
                    notifier.notified().await;
                }
            }
        };

        Ok(StreamSubscription {
            receiver: Box::pin(stream),
        })
    }

    async fn stream_ack(&self, topic: &str, group: &str, id: &str) -> Result<(), TopicError> {
        let id: u64 = id
            .parse()
            .map_err(|_| TopicError::Stream(format!("invalid entry id: {}", id)))?;

        let mut streams = self.state.streams.write();
        let stream = streams
            .get_mut(topic)
            .ok_or_else(|| TopicError::Stream(format!("stream not found: {}", topic)))?;

        let cg = stream.groups.get_mut(group).ok_or_else(|| {
            TopicError::ConsumerGroup(format!("consumer group not found: {}", group))
        })?;

        cg.pending.remove(&id);
        Ok(())
    }

    async fn stream_claim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TopicError> {
        let mut streams = self.state.streams.write();
        let stream = match streams.get_mut(topic) {
            Some(s) => s,
            None => return Ok(vec![]),
        };

        let cg = match stream.groups.get_mut(group) {
            Some(g) => g,
            None => return Ok(vec![]),
        };

        let now = Instant::now();
        let min_idle = std::time::Duration::from_millis(min_idle_ms);
        let mut claimed = Vec::new();

        let idle_ids: Vec<u64> = cg
            .pending
            .iter()
            .filter(|(_, (_, delivery_time))| now.duration_since(*delivery_time) >= min_idle)
            .map(|(&id, _)| id)
            .take(count)
            .collect();

        for id in idle_ids {
            if let Some(entry) = stream.messages.iter().find(|e| e.id == id) {
                cg.pending
                    .insert(id, (consumer.to_string(), Instant::now()));
                claimed.push(StreamMessage {
                    id: id.to_string(),
                    payload: entry.payload.clone(),
                });
            }
        }

        Ok(claimed)
    }

    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        let streams = self.state.streams.read();
        let stream = match streams.get(topic) {
            Some(s) => s,
            None => return Ok(StreamStats::default()),
        };

        let cg = match stream.groups.get(group) {
            Some(g) => g,
            None => {
                return Ok(StreamStats {
                    length: stream.messages.len() as u64,
                    ..Default::default()
                });
            }
        };

        let now = Instant::now();
        let oldest_pending_ms = cg
            .pending
            .values()
            .map(|(_, delivery_time)| now.duration_since(*delivery_time).as_millis() as u64)
            .max();

        Ok(StreamStats {
            length: stream.messages.len() as u64,
            pending: cg.pending.len() as u64,
            consumers: cg.last_delivered.len() as u64,
            oldest_pending_ms,
        })
    }

    // =========================================================================
    // Health
    // =========================================================================

    async fn health_check(&self) -> Result<(), TopicError> {
        // In-memory backend is always healthy
        Ok(())
    }

    async fn shutdown(&self) {}

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_broadcast_publish_subscribe() {
        let backend = MemoryTopicBackend::new();

        let sub = backend.subscribe("test").await.unwrap();
        let mut receiver = sub.receiver;

        backend.publish("test", b"hello").await.unwrap();

        let msg = tokio::time::timeout(tokio::time::Duration::from_millis(100), receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(msg, b"hello");
    }

    #[tokio::test]
    async fn test_broadcast_all_subscribers_receive() {
        let backend = MemoryTopicBackend::new();

        let mut rx1 = backend.subscribe("fanout").await.unwrap().receiver;
        let mut rx2 = backend.subscribe("fanout").await.unwrap().receiver;

        backend.publish("fanout", b"event").await.unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let msg = tokio::time::timeout(tokio::time::Duration::from_millis(100), rx.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(msg, b"event");
        }
    }

    #[tokio::test]
    async fn test_stream_publish_subscribe_ack() {
        let backend = MemoryTopicBackend::new();

        let id = backend.stream_publish("stream", b"msg1").await.unwrap();
        assert_eq!(id, "1");

        let sub = backend
            .stream_subscribe("stream", "group1", "consumer1")
            .await
            .unwrap();
        let mut receiver = sub.receiver;

        let msg = tokio::time::timeout(tokio::time::Duration::from_millis(500), receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(msg.id, "1");
        assert_eq!(msg.payload, b"msg1");

        backend
            .stream_ack("stream", "group1", &msg.id)
            .await
            .unwrap();

        let stats = backend.stream_stats("stream", "group1").await.unwrap();
        assert_eq!(stats.length, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_entry_ids_are_monotonic() {
        let backend = MemoryTopicBackend::new();
        let a: u64 = backend
            .stream_publish("s", b"a")
            .await
            .unwrap()
            .parse()
            .unwrap();
        let b: u64 = backend
            .stream_publish("s", b"b")
            .await
            .unwrap()
            .parse()
            .unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_unacked_entry_stays_pending_and_claimable() {
        let backend = MemoryTopicBackend::new();

        backend.stream_publish("stream", b"msg1").await.unwrap();

        let sub = backend
            .stream_subscribe("stream", "group1", "crashed")
            .await
            .unwrap();
        let mut receiver = sub.receiver;

        // Deliver but never ack - simulates a crashed consumer
        let msg = tokio::time::timeout(tokio::time::Duration::from_millis(500), receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        drop(receiver);

        let stats = backend.stream_stats("stream", "group1").await.unwrap();
        assert_eq!(stats.pending, 1);

        // Another consumer claims it after the idle threshold
        let claimed = backend
            .stream_claim("stream", "group1", "recovery", 0, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, msg.id);
        assert_eq!(claimed[0].payload, b"msg1");

        // After ack it is no longer claimable
        backend
            .stream_ack("stream", "group1", &claimed[0].id)
            .await
            .unwrap();
        let claimed = backend
            .stream_claim("stream", "group1", "recovery", 0, 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn test_claim_honors_min_idle() {
        let backend = MemoryTopicBackend::new();

        backend.stream_publish("stream", b"msg1").await.unwrap();

        let sub = backend
            .stream_subscribe("stream", "group1", "consumer1")
            .await
            .unwrap();
        let mut receiver = sub.receiver;
        let _ = tokio::time::timeout(tokio::time::Duration::from_millis(500), receiver.next())
            .await
            .unwrap();

        // Freshly delivered entry is not idle enough for a 60s threshold
        let claimed = backend
            .stream_claim("stream", "group1", "recovery", 60_000, 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[test]
    fn test_backend_name() {
        let backend = MemoryTopicBackend::new();
        assert_eq!(backend.backend_name(), "memory");
    }
}
