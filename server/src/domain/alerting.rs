//! Alert monitor
//!
//! Periodic evaluator over a sliding window of recent analyses. When the
//! negative/positive ratio crosses the configured threshold, an alert row
//! is persisted and a best-effort notification is published. There is no
//! per-window dedup: the alert keeps firing until the condition clears.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::AlertConfig;
use crate::core::constants::CHANNEL_ALERTS;
use crate::data::PostgresService;
use crate::data::postgres::repositories::{alerts, analytics};
use crate::data::topics::TopicService;
use crate::data::types::{AlertEvent, NewAlert, SentimentCounts};

/// Alert type emitted by the ratio rule
const ALERT_TYPE_NEGATIVE_RATIO: &str = "high_negative_ratio";

/// Sliding-window alert monitor
pub struct AlertMonitor {
    database: Arc<PostgresService>,
    topics: Arc<TopicService>,
    config: AlertConfig,
}

impl AlertMonitor {
    pub fn new(
        database: Arc<PostgresService>,
        topics: Arc<TopicService>,
        config: AlertConfig,
    ) -> Self {
        Self {
            database,
            topics,
            config,
        }
    }

    /// Start the monitoring loop
    ///
    /// Tick errors are logged and the loop continues; the monitor only
    /// stops on shutdown.
    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::debug!(
                threshold = self.config.threshold,
                window_minutes = self.config.window_minutes,
                min_posts = self.config.min_posts,
                "AlertMonitor started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("AlertMonitor shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.check_thresholds().await {
                            tracing::error!(error = %e, "Alert evaluation failed");
                        }
                    }
                }
            }
        })
    }

    /// Evaluate the current window and fire an alert if warranted
    async fn check_thresholds(&self) -> Result<(), crate::data::postgres::PostgresError> {
        let window_end = Utc::now();
        let window_start = window_end - chrono::Duration::minutes(self.config.window_minutes);

        let counts =
            analytics::window_counts(self.database.pool(), window_start, window_end).await?;

        let Some(ratio) = evaluate(&counts, self.config.threshold, self.config.min_posts) else {
            return Ok(());
        };

        let triggered_at = Utc::now();
        let alert = NewAlert {
            alert_type: ALERT_TYPE_NEGATIVE_RATIO.to_string(),
            threshold_value: self.config.threshold,
            actual_value: ratio,
            window_start,
            window_end,
            post_count: counts.total,
            details: json!({
                "positive": counts.positive,
                "negative": counts.negative,
                "neutral": counts.neutral,
                "total": counts.total,
                "window_minutes": self.config.window_minutes,
            }),
            triggered_at,
        };

        let alert_id = alerts::save_alert(self.database.pool(), &alert).await?;
        tracing::warn!(
            alert_id,
            ratio,
            threshold = self.config.threshold,
            negative = counts.negative,
            positive = counts.positive,
            "Alert triggered"
        );

        // Best-effort notification. An unbounded ratio has no JSON
        // representation, so it travels as null.
        let event = AlertEvent {
            alert_type: ALERT_TYPE_NEGATIVE_RATIO.to_string(),
            threshold_value: self.config.threshold,
            actual_value: ratio.is_finite().then_some(ratio),
            window_start,
            window_end,
            post_count: counts.total,
            triggered_at,
        };
        if let Err(e) = self
            .topics
            .broadcast_topic::<AlertEvent>(CHANNEL_ALERTS)
            .publish(&event)
            .await
        {
            tracing::warn!(error = %e, "Failed to publish alert event");
        }

        Ok(())
    }
}

/// Ratio rule: returns the offending ratio when an alert should fire
///
/// - Fewer than `min_posts` in the window: never fires.
/// - `ratio = negative / positive`; with no positives but some negatives
///   the ratio is unbounded (fires for any threshold); with neither it
///   is zero.
pub fn evaluate(counts: &SentimentCounts, threshold: f64, min_posts: i64) -> Option<f64> {
    if counts.total < min_posts {
        return None;
    }

    let ratio = if counts.positive > 0 {
        counts.negative as f64 / counts.positive as f64
    } else if counts.negative > 0 {
        f64::INFINITY
    } else {
        0.0
    };

    (ratio > threshold).then_some(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_above_threshold() {
        // 7 negatives to 3 positives within the window
        let counts = SentimentCounts::new(3, 7, 0);
        let ratio = evaluate(&counts, 2.0, 10).unwrap();
        assert!((ratio - 7.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_does_not_fire_below_threshold() {
        let counts = SentimentCounts::new(5, 5, 0);
        assert!(evaluate(&counts, 2.0, 10).is_none());
    }

    #[test]
    fn test_does_not_fire_at_exact_threshold() {
        let counts = SentimentCounts::new(5, 10, 0);
        assert!(evaluate(&counts, 2.0, 10).is_none());
    }

    #[test]
    fn test_min_posts_gate() {
        // 9 posts in the window, all negative: still no alert
        let counts = SentimentCounts::new(0, 9, 0);
        assert!(evaluate(&counts, 2.0, 10).is_none());
    }

    #[test]
    fn test_zero_positives_is_unbounded() {
        let counts = SentimentCounts::new(0, 10, 0);
        let ratio = evaluate(&counts, 2.0, 10).unwrap();
        assert!(ratio.is_infinite());
    }

    #[test]
    fn test_zero_positives_and_negatives_is_zero_ratio() {
        let counts = SentimentCounts::new(0, 0, 12);
        assert!(evaluate(&counts, 2.0, 10).is_none());
    }

    #[test]
    fn test_neutral_posts_count_toward_minimum() {
        // 3 positives + 7 negatives + 5 neutrals = 15 >= 10
        let counts = SentimentCounts::new(3, 7, 5);
        assert!(evaluate(&counts, 2.0, 10).is_some());
    }
}
