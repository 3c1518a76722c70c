//! Application configuration
//!
//! Configuration is layered: built-in defaults, then environment variables,
//! then CLI overrides. `AppConfig::load` validates the result; an invalid
//! configuration is fatal at startup.

use std::fmt;

use anyhow::Result;

use super::cli::CliConfig;
use super::constants::{
    ALERT_INTERVAL_SECS, DEFAULT_ALERT_MIN_POSTS, DEFAULT_ALERT_THRESHOLD,
    DEFAULT_ALERT_WINDOW_MINUTES, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CLASSIFIER_TIMEOUT_SECS,
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SENTIMENT_MODEL, DEFAULT_WORKER_BATCH_SIZE,
    ENV_ALERT_MIN_POSTS, ENV_ALERT_THRESHOLD, ENV_ALERT_WINDOW_MINUTES, ENV_API_HOST,
    ENV_API_PORT, ENV_CACHE_BACKEND, ENV_CLASSIFIER_MODE, ENV_CLASSIFIER_TIMEOUT_SECS,
    ENV_CONSUMER_GROUP, ENV_DATABASE_URL, ENV_EXTERNAL_LLM_API_KEY, ENV_EXTERNAL_LLM_MODEL,
    ENV_EXTERNAL_LLM_URL, ENV_FRONTEND_ORIGINS, ENV_REDIS_URL, ENV_SENTIMENT_MODEL,
    ENV_STREAM_NAME, ENV_WORKER_BATCH_SIZE, GROUP_WORKERS, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS, STREAM_POSTS,
};

// =============================================================================
// Cache Backend Enum
// =============================================================================

/// Cache/topics backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheBackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for CacheBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackendType::Memory => write!(f, "memory"),
            CacheBackendType::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// Classifier Mode Enum
// =============================================================================

/// Classifier implementation selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClassifierMode {
    #[default]
    Local,
    External,
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierMode::Local => write!(f, "local"),
            ClassifierMode::External => write!(f, "external"),
        }
    }
}

// =============================================================================
// Config Sections
// =============================================================================

/// API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means localhost-only defaults
    pub frontend_origins: Vec<String>,
}

/// PostgreSQL configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub statement_timeout_secs: u64,
}

/// Cache configuration (also drives the topics backend)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendType,
    pub redis_url: Option<String>,
    pub max_entries: u64,
}

/// Stream consumption configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub stream: String,
    pub group: String,
    pub batch_size: usize,
}

/// Classifier configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    /// Local model identifier, recorded as `model_name` on analyses
    pub model: String,
    pub external_url: Option<String>,
    pub external_api_key: Option<String>,
    pub external_model: Option<String>,
    pub timeout_secs: u64,
}

/// Alert monitor configuration
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub threshold: f64,
    pub window_minutes: i64,
    pub min_posts: i64,
    pub interval_secs: u64,
}

// =============================================================================
// AppConfig
// =============================================================================

/// Fully resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub cache: CacheConfig,
    pub stream: StreamConfig,
    pub classifier: ClassifierConfig,
    pub alerts: AlertConfig,
}

impl AppConfig {
    /// Load configuration from environment with CLI overrides, then validate
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let host = cli
            .host
            .clone()
            .or_else(|| env_string(ENV_API_HOST))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli
            .port
            .or_else(|| env_parse(ENV_API_PORT))
            .unwrap_or(DEFAULT_PORT);

        let frontend_origins = env_string(ENV_FRONTEND_ORIGINS)
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let database_url = cli
            .database_url
            .clone()
            .or_else(|| env_string(ENV_DATABASE_URL))
            .unwrap_or_default();

        let redis_url = cli.redis_url.clone().or_else(|| env_string(ENV_REDIS_URL));

        // Default to Redis when a URL is present, memory otherwise
        let cache_backend = cli
            .cache_backend
            .or_else(|| {
                env_string(ENV_CACHE_BACKEND).map(|s| match s.to_lowercase().as_str() {
                    "redis" => CacheBackendType::Redis,
                    _ => CacheBackendType::Memory,
                })
            })
            .unwrap_or(if redis_url.is_some() {
                CacheBackendType::Redis
            } else {
                CacheBackendType::Memory
            });

        let stream = StreamConfig {
            stream: cli
                .stream
                .clone()
                .or_else(|| env_string(ENV_STREAM_NAME))
                .unwrap_or_else(|| STREAM_POSTS.to_string()),
            group: cli
                .group
                .clone()
                .or_else(|| env_string(ENV_CONSUMER_GROUP))
                .unwrap_or_else(|| GROUP_WORKERS.to_string()),
            batch_size: cli
                .batch_size
                .or_else(|| env_parse(ENV_WORKER_BATCH_SIZE))
                .unwrap_or(DEFAULT_WORKER_BATCH_SIZE),
        };

        let classifier_mode = cli
            .classifier_mode
            .or_else(|| {
                env_string(ENV_CLASSIFIER_MODE).map(|s| match s.to_lowercase().as_str() {
                    "external" => ClassifierMode::External,
                    _ => ClassifierMode::Local,
                })
            })
            .unwrap_or_default();

        let classifier = ClassifierConfig {
            mode: classifier_mode,
            model: env_string(ENV_SENTIMENT_MODEL)
                .unwrap_or_else(|| DEFAULT_SENTIMENT_MODEL.to_string()),
            external_url: env_string(ENV_EXTERNAL_LLM_URL),
            external_api_key: env_string(ENV_EXTERNAL_LLM_API_KEY),
            external_model: env_string(ENV_EXTERNAL_LLM_MODEL),
            timeout_secs: env_parse(ENV_CLASSIFIER_TIMEOUT_SECS)
                .unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
        };

        let alerts = AlertConfig {
            threshold: env_parse(ENV_ALERT_THRESHOLD).unwrap_or(DEFAULT_ALERT_THRESHOLD),
            window_minutes: env_parse(ENV_ALERT_WINDOW_MINUTES)
                .unwrap_or(DEFAULT_ALERT_WINDOW_MINUTES),
            min_posts: env_parse(ENV_ALERT_MIN_POSTS).unwrap_or(DEFAULT_ALERT_MIN_POSTS),
            interval_secs: ALERT_INTERVAL_SECS,
        };

        let config = Self {
            server: ServerConfig {
                host,
                port,
                frontend_origins,
            },
            postgres: PostgresConfig {
                url: database_url,
                max_connections: POSTGRES_DEFAULT_MAX_CONNECTIONS,
                min_connections: POSTGRES_DEFAULT_MIN_CONNECTIONS,
                acquire_timeout_secs: POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
                statement_timeout_secs: POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
            },
            cache: CacheConfig {
                backend: cache_backend,
                redis_url,
                max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            },
            stream,
            classifier,
            alerts,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: API_HOST must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: API_PORT must be greater than 0");
        }
        if self.postgres.url.is_empty() {
            anyhow::bail!("Configuration error: DATABASE_URL is required");
        }
        if self.cache.backend == CacheBackendType::Redis
            && self.cache.redis_url.as_ref().is_none_or(|u| u.is_empty())
        {
            anyhow::bail!("Configuration error: REDIS_URL is required when CACHE_BACKEND is 'redis'");
        }
        if self.stream.stream.is_empty() || self.stream.group.is_empty() {
            anyhow::bail!("Configuration error: stream and consumer group names must not be empty");
        }
        if self.stream.batch_size == 0 {
            anyhow::bail!("Configuration error: WORKER_BATCH_SIZE must be greater than 0");
        }
        if self.classifier.mode == ClassifierMode::External {
            if self
                .classifier
                .external_api_key
                .as_ref()
                .is_none_or(|k| k.is_empty())
            {
                anyhow::bail!(
                    "Configuration error: EXTERNAL_LLM_API_KEY is required when CLASSIFIER_MODE is 'external'"
                );
            }
            if self
                .classifier
                .external_model
                .as_ref()
                .is_none_or(|m| m.is_empty())
            {
                anyhow::bail!(
                    "Configuration error: EXTERNAL_LLM_MODEL is required when CLASSIFIER_MODE is 'external'"
                );
            }
        }
        if self.alerts.window_minutes <= 0 {
            anyhow::bail!("Configuration error: ALERT_WINDOW_MINUTES must be greater than 0");
        }
        if self.alerts.threshold <= 0.0 {
            anyhow::bail!(
                "Configuration error: ALERT_NEGATIVE_RATIO_THRESHOLD must be greater than 0"
            );
        }

        if self.cache.backend == CacheBackendType::Memory {
            tracing::warn!(
                "Using the in-memory cache/topics backend; stream entries do not survive restarts"
            );
        }

        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                frontend_origins: vec![],
            },
            postgres: PostgresConfig {
                url: "postgres://localhost/sentiment".to_string(),
                max_connections: POSTGRES_DEFAULT_MAX_CONNECTIONS,
                min_connections: POSTGRES_DEFAULT_MIN_CONNECTIONS,
                acquire_timeout_secs: POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
                statement_timeout_secs: POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
            },
            cache: CacheConfig {
                backend: CacheBackendType::Memory,
                redis_url: None,
                max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            },
            stream: StreamConfig {
                stream: STREAM_POSTS.to_string(),
                group: GROUP_WORKERS.to_string(),
                batch_size: DEFAULT_WORKER_BATCH_SIZE,
            },
            classifier: ClassifierConfig {
                mode: ClassifierMode::Local,
                model: DEFAULT_SENTIMENT_MODEL.to_string(),
                external_url: None,
                external_api_key: None,
                external_model: None,
                timeout_secs: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            },
            alerts: AlertConfig {
                threshold: DEFAULT_ALERT_THRESHOLD,
                window_minutes: DEFAULT_ALERT_WINDOW_MINUTES,
                min_posts: DEFAULT_ALERT_MIN_POSTS,
                interval_secs: ALERT_INTERVAL_SECS,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_database_url_fails() {
        let mut config = base_config();
        config.postgres.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = base_config();
        config.cache.backend = CacheBackendType::Redis;
        config.cache.redis_url = None;
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("redis://localhost:6379".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_external_mode_requires_key_and_model() {
        let mut config = base_config();
        config.classifier.mode = ClassifierMode::External;
        assert!(config.validate().is_err());

        config.classifier.external_api_key = Some("sk-test".to_string());
        assert!(config.validate().is_err());

        config.classifier.external_model = Some("small-classifier".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_fails() {
        let mut config = base_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_fails() {
        let mut config = base_config();
        config.stream.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_alert_window_fails() {
        let mut config = base_config();
        config.alerts.window_minutes = 0;
        assert!(config.validate().is_err());
    }
}
