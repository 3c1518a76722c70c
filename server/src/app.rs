//! Core application

use std::sync::Arc;

use anyhow::Result;

use crate::api::{ApiServer, StreamGateway};
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::PostgresService;
use crate::data::cache::CacheService;
use crate::data::topics::TopicService;
use crate::data::types::IncomingPost;
use crate::domain::classifier::{Classifier, FallbackClassifier};
use crate::domain::{AggregatorService, AlertMonitor, SentimentPipeline};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub database: Arc<PostgresService>,
    pub cache: Arc<CacheService>,
    pub topics: Arc<TopicService>,
    pub classifier: Arc<dyn Classifier>,
    pub aggregator: Arc<AggregatorService>,
    pub gateway: Arc<StreamGateway>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        match command {
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let cache = Arc::new(
            CacheService::new(&config.cache)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize cache service: {}", e))?,
        );
        tracing::debug!(backend = cache.backend_name(), "Cache initialized");

        let topics = Arc::new(
            TopicService::from_cache_config(&config.cache)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize topic service: {}", e))?,
        );
        tracing::debug!(backend = topics.backend_name(), "Topics initialized");

        let database = Arc::new(PostgresService::init(&config.postgres).await?);

        let classifier: Arc<dyn Classifier> = Arc::new(
            FallbackClassifier::from_config(&config.classifier)
                .map_err(|e| anyhow::anyhow!("Failed to initialize classifier: {}", e))?,
        );
        tracing::debug!(mode = %config.classifier.mode, "Classifier initialized");

        let aggregator = Arc::new(AggregatorService::new(database.clone(), cache.clone()));
        let gateway = Arc::new(StreamGateway::new());
        let shutdown = ShutdownService::new(topics.clone(), database.clone());

        Ok(Self {
            shutdown,
            config,
            database,
            cache,
            topics,
            classifier,
            aggregator,
            gateway,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(
                self.database
                    .start_health_check_task(self.shutdown.subscribe()),
            )
            .await;

        // Worker pipeline consuming the post stream
        let posts_topic = self
            .topics
            .stream_topic::<IncomingPost>(&self.config.stream.stream);

        let pipeline = SentimentPipeline::new(
            self.database.clone(),
            self.topics.clone(),
            self.classifier.clone(),
            self.config.stream.clone(),
        );

        self.shutdown
            .register(pipeline.start(posts_topic, self.shutdown.subscribe()))
            .await;

        // Alert monitor
        let monitor = AlertMonitor::new(
            self.database.clone(),
            self.topics.clone(),
            self.config.alerts.clone(),
        );

        self.shutdown
            .register(monitor.start(self.shutdown.subscribe()))
            .await;

        tracing::debug!("Background tasks started");
    }
}
