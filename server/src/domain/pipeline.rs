//! Sentiment processing pipeline
//!
//! Consumes the post stream via a consumer group and turns each entry into
//! a store write plus a best-effort pub/sub announcement:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     SENTIMENT PIPELINE                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐          │
//! │  │ DECODE │──▶│ ANALYZE │──▶│ PERSIST │──▶│ ANNOUNCE │──▶ ACK   │
//! │  │ fields │   │ sent. + │   │ upsert  │   │ pub/sub  │          │
//! │  │ + time │   │ emotion │   │ tx      │   │ event    │          │
//! │  └────────┘   └─────────┘   └─────────┘   └──────────┘          │
//! │      │poison       │retry        │retry/poison                  │
//! │      ▼ack          ▼nack         ▼                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once: entries are acknowledged only after the store
//! commit, malformed entries are acknowledged immediately as poison, and
//! transient failures leave the entry pending for redelivery. Stuck entries
//! from crashed consumers are recovered with a periodic claim pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::config::StreamConfig;
use crate::core::constants::{
    CHANNEL_UPDATES, WORKER_BACKOFF_BASE_SECS, WORKER_BACKOFF_CAP_SECS, WORKER_CLAIM_INTERVAL_SECS,
    WORKER_CLAIM_MAX_COUNT, WORKER_CLAIM_MIN_IDLE_MS, WORKER_PROGRESS_EVERY,
};
use crate::data::PostgresService;
use crate::data::postgres::repositories::posts;
use crate::data::topics::{
    StreamAcker, StreamClaimer, StreamMessage, StreamTopic, TopicError, TopicService,
};
use crate::data::types::{EmotionResult, IncomingPost, PostEvent};
use crate::domain::classifier::Classifier;

/// Timeout for draining additional queued entries into a batch
const BATCH_DRAIN_TIMEOUT: Duration = Duration::from_millis(5);

/// Terminal state of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Processed and committed; acknowledge
    Acked,
    /// Unprocessable; acknowledge and count as failed
    Poison,
    /// Transient failure; leave pending for redelivery
    Retry,
}

/// Exponential backoff hint for transient failures
#[derive(Debug)]
struct Backoff {
    current_secs: u64,
    base_secs: u64,
    cap_secs: u64,
}

impl Backoff {
    fn new(base_secs: u64, cap_secs: u64) -> Self {
        Self {
            current_secs: base_secs,
            base_secs,
            cap_secs,
        }
    }

    /// Current delay, doubling for the next failure up to the cap
    fn next(&mut self) -> Duration {
        let delay = Duration::from_secs(self.current_secs);
        self.current_secs = (self.current_secs * 2).min(self.cap_secs);
        delay
    }

    fn reset(&mut self) {
        self.current_secs = self.base_secs;
    }
}

/// Sentiment pipeline orchestrator
pub struct SentimentPipeline {
    database: Arc<PostgresService>,
    topics: Arc<TopicService>,
    classifier: Arc<dyn Classifier>,
    config: StreamConfig,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl SentimentPipeline {
    pub fn new(
        database: Arc<PostgresService>,
        topics: Arc<TopicService>,
        classifier: Arc<dyn Classifier>,
        config: StreamConfig,
    ) -> Self {
        Self {
            database,
            topics,
            classifier,
            config,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Start the pipeline, consuming from the given stream topic.
    ///
    /// Uses consumer groups for at-least-once delivery:
    /// - Entries are acknowledged after successful processing
    /// - Unacknowledged entries are re-delivered on restart
    /// - Stuck entries are claimed after WORKER_CLAIM_MIN_IDLE_MS
    pub fn start(
        self,
        topic: StreamTopic<IncomingPost>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        // Unique consumer name: {uuid}:{pid}
        let consumer = format!("{}:{}", Uuid::new_v4(), std::process::id());

        tokio::spawn(async move {
            let mut subscriber = match topic.subscribe(&self.config.group, &consumer).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to subscribe to post stream");
                    return;
                }
            };

            let acker = subscriber.acker();
            let claimer = subscriber.claimer();

            tracing::debug!(
                consumer = %consumer,
                group = %self.config.group,
                stream = %self.config.stream,
                "SentimentPipeline started"
            );

            let mut claim_interval =
                tokio::time::interval(Duration::from_secs(WORKER_CLAIM_INTERVAL_SECS));
            claim_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut backoff = Backoff::new(WORKER_BACKOFF_BASE_SECS, WORKER_BACKOFF_CAP_SECS);
            let mut shutdown_requested = false;

            loop {
                if shutdown_requested {
                    // Drain remaining entries briefly, then exit
                    match tokio::time::timeout(Duration::from_millis(100), subscriber.recv()).await
                    {
                        Ok(Ok(msg)) => {
                            let outcome = self.process_entry(&msg).await;
                            if outcome != Outcome::Retry
                                && let Err(e) = acker.ack(&msg.id).await
                            {
                                tracing::warn!(error = %e, entry_id = %msg.id, "Failed to ack during drain");
                            }
                            continue;
                        }
                        Ok(Err(TopicError::Lagged(n))) => {
                            tracing::warn!(lagged = n, "SentimentPipeline lagged during drain");
                            continue;
                        }
                        _ => break,
                    }
                }

                // Phase 1: wait for at least one entry (with shutdown/claim handling)
                let first = tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("SentimentPipeline received shutdown, draining...");
                            shutdown_requested = true;
                        }
                        continue;
                    }
                    result = subscriber.recv() => {
                        match result {
                            Ok(msg) => msg,
                            Err(TopicError::Lagged(n)) => {
                                tracing::warn!(lagged = n, "SentimentPipeline lagged");
                                continue;
                            }
                            Err(TopicError::ChannelClosed) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "SentimentPipeline receive error");
                                break;
                            }
                        }
                    }
                    _ = claim_interval.tick() => {
                        self.claim_stuck_entries(&claimer, &acker, &consumer).await;
                        continue;
                    }
                };

                // Phase 2: drain additional queued entries up to the batch cap.
                // batch_size bounds in-flight work (backpressure).
                let mut batch = vec![first];
                while batch.len() < self.config.batch_size {
                    match tokio::time::timeout(BATCH_DRAIN_TIMEOUT, subscriber.recv()).await {
                        Ok(Ok(msg)) => batch.push(msg),
                        _ => break,
                    }
                }

                let batch_size = batch.len();
                if batch_size > 1 {
                    tracing::debug!(batch_size, "Processing batched entries");
                }

                // Phase 3: process the batch concurrently; tasks join before
                // the next read
                let outcomes =
                    futures::future::join_all(batch.iter().map(|msg| self.process_entry(msg)))
                        .await;

                // Phase 4: acknowledge by outcome
                let mut saw_retry = false;
                for (msg, outcome) in batch.iter().zip(outcomes) {
                    match outcome {
                        Outcome::Acked | Outcome::Poison => {
                            if let Err(e) = acker.ack(&msg.id).await {
                                tracing::warn!(error = %e, entry_id = %msg.id, "Failed to ack entry");
                            }
                        }
                        Outcome::Retry => saw_retry = true,
                    }
                }

                if saw_retry {
                    let delay = backoff.next();
                    tracing::warn!(
                        delay_secs = delay.as_secs(),
                        "Transient failures in batch, backing off before next read"
                    );
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                } else {
                    backoff.reset();
                }
            }

            tracing::debug!(
                processed = self.processed.load(Ordering::Relaxed),
                failed = self.failed.load(Ordering::Relaxed),
                "SentimentPipeline shutdown complete"
            );
        })
    }

    /// Claim and process stuck entries from other consumers.
    ///
    /// Entries pending longer than WORKER_CLAIM_MIN_IDLE_MS are claimed from
    /// other (possibly crashed) consumers, processed, and acknowledged.
    async fn claim_stuck_entries(
        &self,
        claimer: &StreamClaimer,
        acker: &StreamAcker,
        consumer: &str,
    ) {
        match claimer
            .claim(consumer, WORKER_CLAIM_MIN_IDLE_MS, WORKER_CLAIM_MAX_COUNT)
            .await
        {
            Ok(messages) if messages.is_empty() => {
                tracing::trace!("No stuck entries to claim");
            }
            Ok(messages) => {
                let count = messages.len();
                tracing::debug!(count, "Claiming stuck entries");

                for msg in messages {
                    let outcome = self.process_entry(&msg).await;
                    if outcome != Outcome::Retry
                        && let Err(e) = acker.ack(&msg.id).await
                    {
                        tracing::warn!(error = %e, entry_id = %msg.id, "Failed to ack claimed entry");
                    }
                }

                tracing::debug!(count, "Finished processing claimed entries");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to claim stuck entries");
            }
        }
    }

    // ========================================================================
    // PER-ENTRY PROCESSING
    // ========================================================================

    /// Run one entry through decode → analyze → persist → announce.
    async fn process_entry(&self, msg: &StreamMessage) -> Outcome {
        // Decode. Malformed payloads are poison: there is no point
        // re-delivering an entry that can never parse.
        let post = match decode_post(&msg.payload) {
            Ok(post) => post,
            Err(reason) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(entry_id = %msg.id, reason = %reason, "Poison entry, acknowledging without processing");
                return Outcome::Poison;
            }
        };

        // Analyze sentiment. The composite classifier already tried the
        // secondary; a failure here is transient.
        let sentiment = match self.classifier.sentiment(&post.content).await {
            Ok(result) => result,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    entry_id = %msg.id,
                    post_id = %post.post_id,
                    error = %e,
                    "Sentiment analysis failed, leaving entry for redelivery"
                );
                return Outcome::Retry;
            }
        };

        // Analyze emotion. Failure substitutes a neutral result.
        let emotion = match self.classifier.emotion(&post.content).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    post_id = %post.post_id,
                    error = %e,
                    "Emotion analysis failed, substituting neutral"
                );
                EmotionResult::fallback()
            }
        };

        // Persist post + analysis atomically.
        let analyzed_at = Utc::now();
        if let Err(e) = posts::upsert_post_and_analysis(
            self.database.pool(),
            &post,
            &sentiment,
            Some(&emotion),
            analyzed_at,
        )
        .await
        {
            self.failed.fetch_add(1, Ordering::Relaxed);
            if e.is_constraint_violation() {
                tracing::error!(
                    post_id = %post.post_id,
                    error = %e,
                    "Constraint violation persisting entry, acknowledging as poison"
                );
                return Outcome::Poison;
            }
            tracing::error!(
                post_id = %post.post_id,
                error = %e,
                "Transient database error, leaving entry for redelivery"
            );
            return Outcome::Retry;
        }

        // Announce. Best-effort: publish failure never blocks the ack.
        let event = PostEvent {
            post_id: post.post_id.clone(),
            source: post.source.clone(),
            content: post.content.clone(),
            sentiment_label: sentiment.sentiment_label,
            confidence_score: sentiment.confidence_score,
            emotion: Some(emotion.emotion),
            timestamp: analyzed_at,
        };
        if let Err(e) = self
            .topics
            .broadcast_topic::<PostEvent>(CHANNEL_UPDATES)
            .publish(&event)
            .await
        {
            tracing::warn!(post_id = %post.post_id, error = %e, "Failed to publish post event");
        }

        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % WORKER_PROGRESS_EVERY == 0 {
            tracing::info!(
                processed,
                failed = self.failed.load(Ordering::Relaxed),
                "Pipeline progress"
            );
        }

        Outcome::Acked
    }
}

/// Decode and validate a stream payload
fn decode_post(payload: &[u8]) -> Result<IncomingPost, String> {
    let post: IncomingPost =
        serde_json::from_slice(payload).map_err(|e| format!("invalid payload: {e}"))?;
    post.validate()?;
    Ok(post)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_post_valid() {
        let payload = br#"{
            "post_id": "p1",
            "source": "twitter",
            "content": "I love it",
            "author": "user_1",
            "created_at": "2025-06-01T12:00:00Z"
        }"#;
        let post = decode_post(payload).unwrap();
        assert_eq!(post.post_id, "p1");
        assert_eq!(post.source, "twitter");
    }

    #[test]
    fn test_decode_post_missing_field_is_poison() {
        let payload = br#"{"post_id": "p1", "content": "x"}"#;
        assert!(decode_post(payload).is_err());
    }

    #[test]
    fn test_decode_post_invalid_json_is_poison() {
        assert!(decode_post(b"not json").is_err());
    }

    #[test]
    fn test_decode_post_bad_timestamp_is_poison() {
        let payload = br#"{
            "post_id": "p1",
            "source": "twitter",
            "content": "x",
            "author": "a",
            "created_at": "noon-ish"
        }"#;
        assert!(decode_post(payload).is_err());
    }

    #[test]
    fn test_decode_post_empty_post_id_is_poison() {
        let payload = br#"{
            "post_id": "",
            "source": "twitter",
            "content": "x",
            "author": "a",
            "created_at": "2025-06-01T12:00:00Z"
        }"#;
        assert!(decode_post(payload).is_err());
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(1, 30);
        assert_eq!(backoff.next(), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(4));
        assert_eq!(backoff.next(), Duration::from_secs(8));
        assert_eq!(backoff.next(), Duration::from_secs(16));
        assert_eq!(backoff.next(), Duration::from_secs(30));
        assert_eq!(backoff.next(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(1, 30);
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_secs(1));
    }
}
