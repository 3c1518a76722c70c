//! Aggregation queries over analyses

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::types::{BucketRow, SentimentCounts};

/// Time bucket granularity for aggregate queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketPeriod {
    Minute,
    Hour,
    Day,
}

impl BucketPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketPeriod::Minute => "minute",
            BucketPeriod::Hour => "hour",
            BucketPeriod::Day => "day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minute" => Some(BucketPeriod::Minute),
            "hour" => Some(BucketPeriod::Hour),
            "day" => Some(BucketPeriod::Day),
            _ => None,
        }
    }
}

/// Bucketed per-label counts with mean confidence
///
/// Truncates `analyzed_at` to the bucket start in UTC. Buckets with zero
/// rows are omitted (GROUP BY only yields populated buckets).
pub async fn count_by_bucket(
    pool: &PgPool,
    period: BucketPeriod,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source: Option<&str>,
) -> Result<Vec<BucketRow>, PostgresError> {
    // date_trunc's unit is interpolated from a closed enum, not user input
    let sql = format!(
        r#"
        SELECT date_trunc('{period}', a.analyzed_at) AS bucket,
               COUNT(*) FILTER (WHERE a.sentiment_label = 'positive') AS positive,
               COUNT(*) FILTER (WHERE a.sentiment_label = 'negative') AS negative,
               COUNT(*) FILTER (WHERE a.sentiment_label = 'neutral') AS neutral,
               COUNT(*) AS total,
               AVG(a.confidence_score) AS avg_confidence
        FROM analyses a
        JOIN posts p ON p.post_id = a.post_id
        WHERE a.analyzed_at BETWEEN $1 AND $2
          AND ($3::text IS NULL OR p.source = $3)
        GROUP BY bucket
        ORDER BY bucket
        "#,
        period = period.as_str()
    );

    let rows: Vec<(DateTime<Utc>, i64, i64, i64, i64, Option<f64>)> = sqlx::query_as(&sql)
        .bind(start)
        .bind(end)
        .bind(source)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(
            |(bucket, positive, negative, neutral, total, avg_confidence)| BucketRow {
                bucket,
                positive,
                negative,
                neutral,
                total,
                avg_confidence: avg_confidence.unwrap_or(0.0),
            },
        )
        .collect())
}

/// Label distribution plus emotion counts over `analyzed_at >= since`
pub async fn distribution(
    pool: &PgPool,
    since: DateTime<Utc>,
    source: Option<&str>,
) -> Result<(SentimentCounts, HashMap<String, i64>), PostgresError> {
    let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT a.sentiment_label, a.emotion, COUNT(*)
        FROM analyses a
        JOIN posts p ON p.post_id = a.post_id
        WHERE a.analyzed_at >= $1
          AND ($2::text IS NULL OR p.source = $2)
        GROUP BY a.sentiment_label, a.emotion
        "#,
    )
    .bind(since)
    .bind(source)
    .fetch_all(pool)
    .await?;

    let mut positive = 0i64;
    let mut negative = 0i64;
    let mut neutral = 0i64;
    let mut emotions: HashMap<String, i64> = HashMap::new();

    for (label, emotion, count) in rows {
        match label.as_str() {
            "positive" => positive += count,
            "negative" => negative += count,
            "neutral" => neutral += count,
            _ => {}
        }
        if let Some(emotion) = emotion {
            *emotions.entry(emotion).or_insert(0) += count;
        }
    }

    Ok((SentimentCounts::new(positive, negative, neutral), emotions))
}

/// Per-label counts over a half-open window, used by the alerter and the
/// metrics rollups
pub async fn window_counts(
    pool: &PgPool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<SentimentCounts, PostgresError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT a.sentiment_label, COUNT(*)
        FROM analyses a
        WHERE a.analyzed_at >= $1 AND a.analyzed_at < $2
        GROUP BY a.sentiment_label
        "#,
    )
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;

    let mut positive = 0i64;
    let mut negative = 0i64;
    let mut neutral = 0i64;
    for (label, count) in rows {
        match label.as_str() {
            "positive" => positive += count,
            "negative" => negative += count,
            "neutral" => neutral += count,
            _ => {}
        }
    }

    Ok(SentimentCounts::new(positive, negative, neutral))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_period_parse() {
        assert_eq!(BucketPeriod::parse("minute"), Some(BucketPeriod::Minute));
        assert_eq!(BucketPeriod::parse("hour"), Some(BucketPeriod::Hour));
        assert_eq!(BucketPeriod::parse("day"), Some(BucketPeriod::Day));
        assert_eq!(BucketPeriod::parse("week"), None);
        assert_eq!(BucketPeriod::parse("Hour"), None);
    }

    #[test]
    fn test_bucket_period_round_trip() {
        for period in [BucketPeriod::Minute, BucketPeriod::Hour, BucketPeriod::Day] {
            assert_eq!(BucketPeriod::parse(period.as_str()), Some(period));
        }
    }
}
