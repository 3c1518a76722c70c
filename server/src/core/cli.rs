use clap::{Parser, Subcommand};

use super::config::{CacheBackendType, ClassifierMode};
use super::constants::{
    ENV_API_HOST, ENV_API_PORT, ENV_CACHE_BACKEND, ENV_CLASSIFIER_MODE, ENV_CONSUMER_GROUP,
    ENV_DATABASE_URL, ENV_REDIS_URL, ENV_STREAM_NAME, ENV_WORKER_BATCH_SIZE,
};

#[derive(Parser)]
#[command(name = "sentimentd")]
#[command(version, about = "Real-time sentiment analytics pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// API bind host
    #[arg(long, short = 'H', global = true, env = ENV_API_HOST)]
    pub host: Option<String>,

    /// API bind port
    #[arg(long, short = 'p', global = true, env = ENV_API_PORT)]
    pub port: Option<u16>,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// Redis URL (cache, streams, and pub/sub)
    #[arg(long, global = true, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// Cache/topics backend (memory or redis)
    #[arg(long, global = true, env = ENV_CACHE_BACKEND, value_parser = parse_cache_backend_type)]
    pub cache_backend: Option<CacheBackendType>,

    /// Post stream name
    #[arg(long, global = true, env = ENV_STREAM_NAME)]
    pub stream: Option<String>,

    /// Worker consumer group name
    #[arg(long, global = true, env = ENV_CONSUMER_GROUP)]
    pub group: Option<String>,

    /// Entries dispatched per worker read cycle
    #[arg(long, global = true, env = ENV_WORKER_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Classifier mode (local or external)
    #[arg(long, global = true, env = ENV_CLASSIFIER_MODE, value_parser = parse_classifier_mode)]
    pub classifier_mode: Option<ClassifierMode>,
}

/// Parse cache backend type from CLI/env string
fn parse_cache_backend_type(s: &str) -> Result<CacheBackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(CacheBackendType::Memory),
        "redis" => Ok(CacheBackendType::Redis),
        _ => Err(format!(
            "Invalid cache backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

/// Parse classifier mode from CLI/env string
fn parse_classifier_mode(s: &str) -> Result<ClassifierMode, String> {
    match s.to_lowercase().as_str() {
        "local" => Ok(ClassifierMode::Local),
        "external" => Ok(ClassifierMode::External),
        _ => Err(format!(
            "Invalid classifier mode '{}'. Valid options: local, external",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_backend: Option<CacheBackendType>,
    pub stream: Option<String>,
    pub group: Option<String>,
    pub batch_size: Option<usize>,
    pub classifier_mode: Option<ClassifierMode>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        database_url: cli.database_url,
        redis_url: cli.redis_url,
        cache_backend: cli.cache_backend,
        stream: cli.stream,
        group: cli.group,
        batch_size: cli.batch_size,
        classifier_mode: cli.classifier_mode,
    };
    (config, cli.command)
}
