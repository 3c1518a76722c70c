//! API server initialization

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::ApiState;
use super::routes::{health, posts, sentiment, stream};
use crate::core::CoreApp;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        // Clone shutdown before moving pieces into state
        let shutdown = app.shutdown.clone();

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(host.parse()?, port);

        let state = ApiState {
            database: app.database.clone(),
            cache: app.cache.clone(),
            topics: app.topics.clone(),
            aggregator: app.aggregator.clone(),
            gateway: app.gateway.clone(),
            shutdown_rx: shutdown.subscribe(),
        };

        let router = Router::new()
            .route("/api/health", get(health::health))
            .route("/api/posts", get(posts::get_posts))
            .route("/api/sentiment/aggregate", get(sentiment::get_aggregate))
            .route("/api/sentiment/distribution", get(sentiment::get_distribution))
            .route("/ws/sentiment", get(stream::ws_upgrade))
            .layer(cors_layer(&app.config.server.frontend_origins))
            .with_state(state);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(host = %host, port, "API server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

/// Build the CORS layer from the configured frontend origins
///
/// With no configured origins the API stays open (dashboards on arbitrary
/// local ports during development); configuring origins locks it down.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_TYPE])
}
