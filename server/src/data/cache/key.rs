//! Cache key construction
//!
//! All keys carry the `sentiment_cache` namespace prefix. The aggregate and
//! distribution key shapes are part of the external interface: responses
//! cached by one process must be found by any other.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::constants::CACHE_PREFIX;

/// Typed cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Key for an aggregate response:
    /// `sentiment_cache:aggregate:{period}:{startISO}:{endISO}:{source|all}`
    pub fn aggregate(
        period: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: Option<&str>,
    ) -> String {
        format!(
            "{}:aggregate:{}:{}:{}:{}",
            CACHE_PREFIX,
            period,
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true),
            source.unwrap_or("all"),
        )
    }

    /// Key for a distribution response:
    /// `sentiment_cache:distribution:{hours}:{source|all}`
    pub fn distribution(hours: i64, source: Option<&str>) -> String {
        format!(
            "{}:distribution:{}:{}",
            CACHE_PREFIX,
            hours,
            source.unwrap_or("all"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_aggregate_key_shape() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let key = CacheKey::aggregate("hour", start, end, Some("twitter"));
        assert_eq!(
            key,
            "sentiment_cache:aggregate:hour:2025-06-01T00:00:00Z:2025-06-02T00:00:00Z:twitter"
        );
    }

    #[test]
    fn test_aggregate_key_defaults_to_all_sources() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let key = CacheKey::aggregate("minute", start, end, None);
        assert!(key.ends_with(":all"));
        assert!(key.starts_with("sentiment_cache:aggregate:minute:"));
    }

    #[test]
    fn test_distribution_key_shape() {
        assert_eq!(
            CacheKey::distribution(24, None),
            "sentiment_cache:distribution:24:all"
        );
        assert_eq!(
            CacheKey::distribution(1, Some("reddit")),
            "sentiment_cache:distribution:1:reddit"
        );
    }
}
