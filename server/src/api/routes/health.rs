//! Health check endpoint
//!
//! Probes the store and the cache and reports per-service status plus basic
//! counters. Returns 200 only when both services respond; stats are
//! best-effort and degrade to zeros.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::super::ApiState;
use crate::data::postgres::repositories::posts;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: HealthServices,
    pub stats: HealthStats,
}

#[derive(Serialize)]
pub struct HealthServices {
    pub database: &'static str,
    pub redis: &'static str,
}

#[derive(Serialize, Default)]
pub struct HealthStats {
    pub total_posts: i64,
    pub total_analyses: i64,
    pub recent_posts_1h: i64,
}

/// Health check endpoint
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let database_ok = match state.database.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health probe failed");
            false
        }
    };

    let cache_ok = match state.cache.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Cache health probe failed");
            false
        }
    };

    let stats = if database_ok {
        match posts::store_stats(state.database.pool()).await {
            Ok(stats) => HealthStats {
                total_posts: stats.total_posts,
                total_analyses: stats.total_analyses,
                recent_posts_1h: stats.recent_posts_1h,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect health stats");
                HealthStats::default()
            }
        }
    } else {
        HealthStats::default()
    };

    let healthy = database_ok && cache_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            timestamp: Utc::now(),
            services: HealthServices {
                database: service_status(database_ok),
                redis: service_status(cache_ok),
            },
            stats,
        }),
    )
}

fn service_status(ok: bool) -> &'static str {
    if ok { "connected" } else { "disconnected" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_status() {
        assert_eq!(service_status(true), "connected");
        assert_eq!(service_status(false), "disconnected");
    }

    #[test]
    fn test_health_response_shape() {
        let response = HealthResponse {
            status: "healthy",
            timestamp: Utc::now(),
            services: HealthServices {
                database: "connected",
                redis: "connected",
            },
            stats: HealthStats {
                total_posts: 10,
                total_analyses: 9,
                recent_posts_1h: 3,
            },
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["services"]["database"], "connected");
        assert_eq!(value["services"]["redis"], "connected");
        assert_eq!(value["stats"]["total_posts"], 10);
        assert_eq!(value["stats"]["recent_posts_1h"], 3);
    }
}
