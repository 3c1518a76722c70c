//! API server and routes

pub mod routes;
mod server;
pub mod types;

use std::sync::Arc;

use tokio::sync::watch;

pub use routes::stream::StreamGateway;
pub use server::ApiServer;

use crate::data::PostgresService;
use crate::data::cache::CacheService;
use crate::data::topics::TopicService;
use crate::domain::AggregatorService;

/// Shared state for all API routes
#[derive(Clone)]
pub struct ApiState {
    pub database: Arc<PostgresService>,
    pub cache: Arc<CacheService>,
    pub topics: Arc<TopicService>,
    pub aggregator: Arc<AggregatorService>,
    pub gateway: Arc<StreamGateway>,
    pub shutdown_rx: watch::Receiver<bool>,
}
