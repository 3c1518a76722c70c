//! Shared data types
//!
//! Typed records for every boundary the pipeline crosses: stream payloads,
//! database rows, pub/sub events, and push frames. Untyped payloads are
//! decoded into these and validated at the edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::constants::MAX_CONTENT_BYTES;

// =============================================================================
// Enums
// =============================================================================

/// Sentiment label attached to an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }

    /// Parse a stored label; unknown values are rejected at the boundary
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(SentimentLabel::Positive),
            "negative" => Some(SentimentLabel::Negative),
            "neutral" => Some(SentimentLabel::Neutral),
            _ => None,
        }
    }
}

/// Emotion label attached to an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Neutral,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "joy" => Some(Emotion::Joy),
            "sadness" => Some(Emotion::Sadness),
            "anger" => Some(Emotion::Anger),
            "fear" => Some(Emotion::Fear),
            "surprise" => Some(Emotion::Surprise),
            "neutral" => Some(Emotion::Neutral),
            _ => None,
        }
    }
}

// =============================================================================
// Stream Payloads
// =============================================================================

/// A post as published on the ingest stream
///
/// All fields are required; entries missing any of them are poison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingPost {
    pub post_id: String,
    pub source: String,
    pub content: String,
    pub author: String,
    /// Event time as an RFC 3339 UTC instant
    pub created_at: DateTime<Utc>,
}

impl IncomingPost {
    /// Validate constraints that JSON decoding cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.post_id.is_empty() {
            return Err("post_id must not be empty".to_string());
        }
        if self.source.is_empty() {
            return Err("source must not be empty".to_string());
        }
        if self.content.len() > MAX_CONTENT_BYTES {
            return Err(format!(
                "content exceeds {} bytes ({})",
                MAX_CONTENT_BYTES,
                self.content.len()
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Classifier Results
// =============================================================================

/// Result of a sentiment classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment_label: SentimentLabel,
    pub confidence_score: f64,
    pub model_name: String,
}

/// Result of an emotion classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionResult {
    pub emotion: Emotion,
    pub confidence_score: f64,
    pub model_name: String,
}

impl EmotionResult {
    /// Substitute used when emotion classification fails (worker step 4)
    pub fn fallback() -> Self {
        Self {
            emotion: Emotion::Neutral,
            confidence_score: 0.5,
            model_name: "fallback".to_string(),
        }
    }
}

// =============================================================================
// Database Rows
// =============================================================================

/// Post joined with its analysis (nullable) for the posts listing
#[derive(Debug, Clone, Serialize)]
pub struct PostWithAnalysis {
    pub post_id: String,
    pub source: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub sentiment: Option<AnalysisSummary>,
}

/// Analysis fields exposed on a post row
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub emotion: Option<Emotion>,
    pub model_name: String,
}

/// Per-label counts over a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: i64,
    pub negative: i64,
    pub neutral: i64,
    pub total: i64,
}

impl SentimentCounts {
    pub fn new(positive: i64, negative: i64, neutral: i64) -> Self {
        Self {
            positive,
            negative,
            neutral,
            total: positive + negative + neutral,
        }
    }
}

/// One time bucket of the aggregate query
#[derive(Debug, Clone)]
pub struct BucketRow {
    pub bucket: DateTime<Utc>,
    pub positive: i64,
    pub negative: i64,
    pub neutral: i64,
    pub total: i64,
    /// Mean confidence over rows in the bucket, 0.0 when empty
    pub avg_confidence: f64,
}

/// Alert record to persist (append-only)
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_type: String,
    pub threshold_value: f64,
    pub actual_value: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub post_count: i64,
    pub details: serde_json::Value,
    pub triggered_at: DateTime<Utc>,
}

// =============================================================================
// Pub/Sub Events
// =============================================================================

/// Per-post event published on the updates channel after persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEvent {
    pub post_id: String,
    pub source: String,
    pub content: String,
    pub sentiment_label: SentimentLabel,
    pub confidence_score: f64,
    pub emotion: Option<Emotion>,
    pub timestamp: DateTime<Utc>,
}

/// Alert event published on the alerts channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_type: String,
    pub threshold_value: f64,
    /// None when the ratio is unbounded (no positives in the window)
    pub actual_value: Option<f64>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub post_count: i64,
    pub triggered_at: DateTime<Utc>,
}

// =============================================================================
// Push Frames
// =============================================================================

/// Rollup counts carried by metrics_update frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsFrame {
    pub last_minute: SentimentCounts,
    pub last_hour: SentimentCounts,
    pub last_24_hours: SentimentCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(content: &str) -> IncomingPost {
        IncomingPost {
            post_id: "p1".to_string(),
            source: "twitter".to_string(),
            content: content.to_string(),
            author: "user_1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_label_round_trip() {
        for label in ["positive", "negative", "neutral"] {
            assert_eq!(SentimentLabel::parse(label).unwrap().as_str(), label);
        }
        assert!(SentimentLabel::parse("mixed").is_none());
    }

    #[test]
    fn test_emotion_round_trip() {
        for emotion in ["joy", "sadness", "anger", "fear", "surprise", "neutral"] {
            assert_eq!(Emotion::parse(emotion).unwrap().as_str(), emotion);
        }
        assert!(Emotion::parse("disgust").is_none());
    }

    #[test]
    fn test_label_serde_lowercase() {
        let json = serde_json::to_string(&SentimentLabel::Positive).unwrap();
        assert_eq!(json, "\"positive\"");
        let back: SentimentLabel = serde_json::from_str("\"negative\"").unwrap();
        assert_eq!(back, SentimentLabel::Negative);
    }

    #[test]
    fn test_incoming_post_decode() {
        let raw = r#"{
            "post_id": "post_abc",
            "source": "reddit",
            "content": "I love it",
            "author": "user_42",
            "created_at": "2025-06-01T12:00:00Z"
        }"#;
        let post: IncomingPost = serde_json::from_str(raw).unwrap();
        assert_eq!(post.post_id, "post_abc");
        assert!(post.validate().is_ok());
    }

    #[test]
    fn test_incoming_post_missing_field_rejected() {
        let raw = r#"{"post_id": "p1", "source": "news", "author": "a"}"#;
        assert!(serde_json::from_str::<IncomingPost>(raw).is_err());
    }

    #[test]
    fn test_incoming_post_bad_timestamp_rejected() {
        let raw = r#"{
            "post_id": "p1",
            "source": "news",
            "content": "ok",
            "author": "a",
            "created_at": "yesterday"
        }"#;
        assert!(serde_json::from_str::<IncomingPost>(raw).is_err());
    }

    #[test]
    fn test_oversized_content_rejected() {
        let big = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(post(&big).validate().is_err());
        let max = "x".repeat(MAX_CONTENT_BYTES);
        assert!(post(&max).validate().is_ok());
    }

    #[test]
    fn test_sentiment_counts_total() {
        let counts = SentimentCounts::new(3, 7, 2);
        assert_eq!(counts.total, 12);
    }

    #[test]
    fn test_emotion_fallback() {
        let fallback = EmotionResult::fallback();
        assert_eq!(fallback.emotion, Emotion::Neutral);
        assert_eq!(fallback.confidence_score, 0.5);
    }
}
