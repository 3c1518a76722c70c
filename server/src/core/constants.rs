// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for identifiers and default log filter)
pub const APP_NAME_LOWER: &str = "sentiment";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for API bind host
pub const ENV_API_HOST: &str = "API_HOST";

/// Environment variable for API bind port
pub const ENV_API_PORT: &str = "API_PORT";

/// Environment variable for log level/filter (falls back to RUST_LOG)
pub const ENV_LOG: &str = "SENTIMENT_LOG";

/// Environment variable for allowed frontend origins (comma-separated)
pub const ENV_FRONTEND_ORIGINS: &str = "FRONTEND_ORIGINS";

// =============================================================================
// Environment Variables - Storage
// =============================================================================

/// Environment variable for the PostgreSQL DSN
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Environment variable for the Redis URL (cache + streams)
pub const ENV_REDIS_URL: &str = "REDIS_URL";

/// Environment variable selecting the cache/topics backend (`memory` | `redis`)
pub const ENV_CACHE_BACKEND: &str = "CACHE_BACKEND";

// =============================================================================
// Environment Variables - Stream
// =============================================================================

/// Environment variable for the post stream name
pub const ENV_STREAM_NAME: &str = "REDIS_STREAM_NAME";

/// Environment variable for the worker consumer group
pub const ENV_CONSUMER_GROUP: &str = "REDIS_CONSUMER_GROUP";

/// Environment variable for the worker batch size
pub const ENV_WORKER_BATCH_SIZE: &str = "WORKER_BATCH_SIZE";

// =============================================================================
// Environment Variables - Classifier
// =============================================================================

/// Environment variable for classifier mode (`local` | `external`)
pub const ENV_CLASSIFIER_MODE: &str = "CLASSIFIER_MODE";

/// Environment variable for the local model identifier
pub const ENV_SENTIMENT_MODEL: &str = "SENTIMENT_MODEL";

/// Environment variable for the external classifier endpoint URL
pub const ENV_EXTERNAL_LLM_URL: &str = "EXTERNAL_LLM_URL";

/// Environment variable for the external classifier API key
pub const ENV_EXTERNAL_LLM_API_KEY: &str = "EXTERNAL_LLM_API_KEY";

/// Environment variable for the external classifier model name
pub const ENV_EXTERNAL_LLM_MODEL: &str = "EXTERNAL_LLM_MODEL";

/// Environment variable for the classifier request timeout (seconds)
pub const ENV_CLASSIFIER_TIMEOUT_SECS: &str = "CLASSIFIER_TIMEOUT_SECS";

// =============================================================================
// Environment Variables - Alerting
// =============================================================================

/// Environment variable for the negative/positive ratio threshold
pub const ENV_ALERT_THRESHOLD: &str = "ALERT_NEGATIVE_RATIO_THRESHOLD";

/// Environment variable for the alert window (minutes)
pub const ENV_ALERT_WINDOW_MINUTES: &str = "ALERT_WINDOW_MINUTES";

/// Environment variable for the minimum posts required to evaluate
pub const ENV_ALERT_MIN_POSTS: &str = "ALERT_MIN_POSTS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default API bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default API bind port
pub const DEFAULT_PORT: u16 = 8000;

// =============================================================================
// Stream / Channel Identifiers
// =============================================================================

/// Stream carrying incoming posts
pub const STREAM_POSTS: &str = "social_posts_stream";

/// Consumer group for the sentiment workers
pub const GROUP_WORKERS: &str = "sentiment_workers";

/// Broadcast channel for per-post events
pub const CHANNEL_UPDATES: &str = "sentiment_updates";

/// Broadcast channel for alert events
pub const CHANNEL_ALERTS: &str = "sentiment_alerts";

// =============================================================================
// Cache
// =============================================================================

/// Namespace prefix for all cache keys
pub const CACHE_PREFIX: &str = "sentiment_cache";

/// TTL for cached aggregate/distribution responses (seconds)
pub const CACHE_TTL_SECS: u64 = 60;

/// Default max entries for the in-memory cache backend
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

// =============================================================================
// Worker Defaults
// =============================================================================

/// Default number of entries dispatched per read cycle
pub const DEFAULT_WORKER_BATCH_SIZE: usize = 16;

/// Initial retry backoff after a transient failure (seconds)
pub const WORKER_BACKOFF_BASE_SECS: u64 = 1;

/// Retry backoff cap (seconds)
pub const WORKER_BACKOFF_CAP_SECS: u64 = 30;

/// Interval for claiming stuck stream entries (seconds)
pub const WORKER_CLAIM_INTERVAL_SECS: u64 = 30;

/// Minimum idle time before a pending entry is claimed (milliseconds)
pub const WORKER_CLAIM_MIN_IDLE_MS: u64 = 60_000;

/// Maximum entries claimed per recovery pass
pub const WORKER_CLAIM_MAX_COUNT: usize = 100;

/// Log a progress line every this many processed entries
pub const WORKER_PROGRESS_EVERY: u64 = 10;

// =============================================================================
// Post Constraints
// =============================================================================

/// Maximum accepted post content size in bytes
pub const MAX_CONTENT_BYTES: usize = 10_000;

/// Maximum content preview length in push frames (characters)
pub const CONTENT_PREVIEW_CHARS: usize = 100;

// =============================================================================
// Classifier Defaults
// =============================================================================

/// Default local sentiment model identifier
pub const DEFAULT_SENTIMENT_MODEL: &str = "lexicon-sentiment-en-v1";

/// Default per-request classifier timeout (seconds)
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// Alert Defaults
// =============================================================================

/// Default negative/positive ratio threshold
pub const DEFAULT_ALERT_THRESHOLD: f64 = 2.0;

/// Default sliding window length (minutes)
pub const DEFAULT_ALERT_WINDOW_MINUTES: i64 = 5;

/// Default minimum posts in window before evaluating
pub const DEFAULT_ALERT_MIN_POSTS: i64 = 10;

/// Default monitor tick interval (seconds)
pub const ALERT_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Push Gateway
// =============================================================================

/// Interval between metrics_update frames (seconds)
pub const METRICS_INTERVAL_SECS: u64 = 30;

// =============================================================================
// PostgreSQL Defaults
// =============================================================================

pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown (seconds)
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 15;
