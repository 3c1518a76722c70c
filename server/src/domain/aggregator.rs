//! Aggregation engine
//!
//! Serves bucketed sentiment counts and label distributions with a
//! short-TTL cache in front of the store. The cache is advisory: errors on
//! get or set are logged and treated as misses, every response is
//! recomputable from PostgreSQL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::constants::CACHE_TTL_SECS;
use crate::data::PostgresService;
use crate::data::cache::{CacheKey, CacheService};
use crate::data::postgres::PostgresError;
use crate::data::postgres::repositories::analytics::{self, BucketPeriod};
use crate::data::types::{BucketRow, MetricsFrame, SentimentCounts};

/// Number of emotions reported in distribution responses
const TOP_EMOTIONS: usize = 5;

// =============================================================================
// Response Types
// =============================================================================

/// One bucket of an aggregate response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub timestamp: DateTime<Utc>,
    pub positive_count: i64,
    pub negative_count: i64,
    pub neutral_count: i64,
    pub total_count: i64,
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    pub neutral_percentage: f64,
    pub average_confidence: f64,
}

/// Range totals of an aggregate response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total_posts: i64,
    pub positive_total: i64,
    pub negative_total: i64,
    pub neutral_total: i64,
}

/// Response of the aggregate operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub period: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub data: Vec<AggregateBucket>,
    pub summary: AggregateSummary,
}

/// Label percentages of a distribution response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionPercentages {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

/// Label counts of a distribution response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionCounts {
    pub positive: i64,
    pub negative: i64,
    pub neutral: i64,
}

/// Response of the distribution operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionResponse {
    pub timeframe_hours: i64,
    pub source: Option<String>,
    pub distribution: DistributionCounts,
    pub total: i64,
    pub percentages: DistributionPercentages,
    /// Top emotions by count, at most five, descending
    pub top_emotions: serde_json::Map<String, serde_json::Value>,
    pub cached: bool,
    pub cached_at: DateTime<Utc>,
}

// =============================================================================
// Service
// =============================================================================

/// Aggregation service with cached reads
pub struct AggregatorService {
    database: Arc<PostgresService>,
    cache: Arc<CacheService>,
}

impl AggregatorService {
    pub fn new(database: Arc<PostgresService>, cache: Arc<CacheService>) -> Self {
        Self { database, cache }
    }

    /// Bucketed counts over a time range
    ///
    /// Defaults: `end` = now, `start` = `end` - 24h. Responses are cached
    /// for 60 seconds under the canonical aggregate key; a hit is returned
    /// verbatim.
    pub async fn aggregate(
        &self,
        period: BucketPeriod,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        source: Option<&str>,
    ) -> Result<AggregateResponse, PostgresError> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or(end - chrono::Duration::hours(24));

        let key = CacheKey::aggregate(period.as_str(), start, end, source);
        if let Some(cached) = self.cache_get::<AggregateResponse>(&key).await {
            return Ok(cached);
        }

        let rows =
            analytics::count_by_bucket(self.database.pool(), period, start, end, source).await?;
        let response = build_aggregate_response(period, start, end, rows);

        self.cache_set(&key, &response).await;
        Ok(response)
    }

    /// Label distribution over the trailing `hours`
    ///
    /// On a hit the cached payload is returned verbatim except for the
    /// `cached` marker, which flips to true.
    pub async fn distribution(
        &self,
        hours: i64,
        source: Option<&str>,
    ) -> Result<DistributionResponse, PostgresError> {
        let key = CacheKey::distribution(hours, source);
        if let Some(mut cached) = self.cache_get::<DistributionResponse>(&key).await {
            cached.cached = true;
            return Ok(cached);
        }

        let since = Utc::now() - chrono::Duration::hours(hours);
        let (counts, emotions) =
            analytics::distribution(self.database.pool(), since, source).await?;
        let response = build_distribution_response(hours, source, counts, emotions, Utc::now());

        self.cache_set(&key, &response).await;
        Ok(response)
    }

    /// Rollup counts for push-channel metrics frames
    ///
    /// `last_minute` is a true one-minute window.
    pub async fn realtime_metrics(&self) -> Result<MetricsFrame, PostgresError> {
        let now = Utc::now();
        let pool = self.database.pool();

        let last_minute =
            analytics::window_counts(pool, now - chrono::Duration::minutes(1), now).await?;
        let last_hour =
            analytics::window_counts(pool, now - chrono::Duration::hours(1), now).await?;
        let last_24_hours =
            analytics::window_counts(pool, now - chrono::Duration::hours(24), now).await?;

        Ok(MetricsFrame {
            last_minute,
            last_hour,
            last_24_hours,
        })
    }

    /// Cache read; errors degrade to a miss
    async fn cache_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get::<T>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Cache write-through; errors are logged and ignored
    async fn cache_set<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self
            .cache
            .set(key, value, Some(Duration::from_secs(CACHE_TTL_SECS)))
            .await
        {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

// =============================================================================
// Pure response builders
// =============================================================================

fn pct(count: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Assemble the aggregate response from bucket rows
fn build_aggregate_response(
    period: BucketPeriod,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rows: Vec<BucketRow>,
) -> AggregateResponse {
    let mut summary = AggregateSummary {
        total_posts: 0,
        positive_total: 0,
        negative_total: 0,
        neutral_total: 0,
    };

    let data = rows
        .into_iter()
        .map(|row| {
            summary.total_posts += row.total;
            summary.positive_total += row.positive;
            summary.negative_total += row.negative;
            summary.neutral_total += row.neutral;

            AggregateBucket {
                timestamp: row.bucket,
                positive_count: row.positive,
                negative_count: row.negative,
                neutral_count: row.neutral,
                total_count: row.total,
                positive_percentage: pct(row.positive, row.total),
                negative_percentage: pct(row.negative, row.total),
                neutral_percentage: pct(row.neutral, row.total),
                average_confidence: row.avg_confidence,
            }
        })
        .collect();

    AggregateResponse {
        period: period.as_str().to_string(),
        start_date: start,
        end_date: end,
        data,
        summary,
    }
}

/// Assemble the distribution response
fn build_distribution_response(
    hours: i64,
    source: Option<&str>,
    counts: SentimentCounts,
    emotions: HashMap<String, i64>,
    now: DateTime<Utc>,
) -> DistributionResponse {
    let mut ranked: Vec<(String, i64)> = emotions.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let top_emotions = ranked
        .into_iter()
        .take(TOP_EMOTIONS)
        .map(|(emotion, count)| (emotion, serde_json::Value::from(count)))
        .collect();

    DistributionResponse {
        timeframe_hours: hours,
        source: source.map(|s| s.to_string()),
        distribution: DistributionCounts {
            positive: counts.positive,
            negative: counts.negative,
            neutral: counts.neutral,
        },
        total: counts.total,
        percentages: DistributionPercentages {
            positive: pct(counts.positive, counts.total),
            negative: pct(counts.negative, counts.total),
            neutral: pct(counts.neutral, counts.total),
        },
        top_emotions,
        cached: false,
        cached_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap()
    }

    fn bucket(hour: u32, positive: i64, negative: i64, neutral: i64, conf: f64) -> BucketRow {
        BucketRow {
            bucket: t(hour),
            positive,
            negative,
            neutral,
            total: positive + negative + neutral,
            avg_confidence: conf,
        }
    }

    #[test]
    fn test_aggregate_bucket_counts_sum_to_total() {
        let rows = vec![bucket(0, 2, 1, 1, 0.8), bucket(1, 0, 3, 0, 0.7)];
        let response = build_aggregate_response(BucketPeriod::Hour, t(0), t(2), rows);

        for bucket in &response.data {
            assert_eq!(
                bucket.positive_count + bucket.negative_count + bucket.neutral_count,
                bucket.total_count
            );
        }
    }

    #[test]
    fn test_aggregate_summary_totals() {
        let rows = vec![bucket(0, 2, 1, 1, 0.8), bucket(1, 0, 3, 0, 0.7)];
        let response = build_aggregate_response(BucketPeriod::Hour, t(0), t(2), rows);

        assert_eq!(response.summary.total_posts, 7);
        assert_eq!(response.summary.positive_total, 2);
        assert_eq!(response.summary.negative_total, 4);
        assert_eq!(response.summary.neutral_total, 1);

        let bucket_sum: i64 = response.data.iter().map(|b| b.total_count).sum();
        assert_eq!(response.summary.total_posts, bucket_sum);
    }

    #[test]
    fn test_aggregate_empty_range() {
        let response = build_aggregate_response(BucketPeriod::Minute, t(0), t(1), vec![]);
        assert!(response.data.is_empty());
        assert_eq!(response.summary.total_posts, 0);
        assert_eq!(response.period, "minute");
    }

    #[test]
    fn test_bucket_percentages() {
        let rows = vec![bucket(0, 1, 1, 2, 0.9)];
        let response = build_aggregate_response(BucketPeriod::Hour, t(0), t(1), rows);

        let bucket = &response.data[0];
        assert_eq!(bucket.positive_percentage, 25.0);
        assert_eq!(bucket.negative_percentage, 25.0);
        assert_eq!(bucket.neutral_percentage, 50.0);
    }

    #[test]
    fn test_distribution_even_split() {
        let counts = SentimentCounts::new(1, 1, 1);
        let response =
            build_distribution_response(1, None, counts, HashMap::new(), Utc::now());

        assert_eq!(response.total, 3);
        let sum = response.percentages.positive
            + response.percentages.negative
            + response.percentages.neutral;
        assert!((sum - 100.0).abs() < 0.1);
        assert!((response.percentages.positive - 33.33).abs() < 0.01);
        assert!(!response.cached);
    }

    #[test]
    fn test_distribution_empty_store() {
        let counts = SentimentCounts::default();
        let response =
            build_distribution_response(24, None, counts, HashMap::new(), Utc::now());

        assert_eq!(response.total, 0);
        assert_eq!(response.percentages.positive, 0.0);
        assert_eq!(response.percentages.negative, 0.0);
        assert_eq!(response.percentages.neutral, 0.0);
        assert!(response.top_emotions.is_empty());
    }

    #[test]
    fn test_distribution_top_emotions_capped_and_sorted() {
        let mut emotions = HashMap::new();
        for (name, count) in [
            ("joy", 10i64),
            ("sadness", 8),
            ("anger", 6),
            ("fear", 4),
            ("surprise", 2),
            ("neutral", 1),
        ] {
            emotions.insert(name.to_string(), count);
        }

        let counts = SentimentCounts::new(10, 11, 10);
        let response = build_distribution_response(24, Some("twitter"), counts, emotions, Utc::now());

        assert_eq!(response.top_emotions.len(), 5);
        let keys: Vec<&String> = response.top_emotions.keys().collect();
        assert_eq!(keys[0], "joy");
        assert_eq!(keys[4], "surprise");
        assert!(!response.top_emotions.contains_key("neutral"));
        assert_eq!(response.source.as_deref(), Some("twitter"));
    }

    #[test]
    fn test_pct_zero_total() {
        assert_eq!(pct(5, 0), 0.0);
        assert_eq!(pct(0, 0), 0.0);
    }
}
