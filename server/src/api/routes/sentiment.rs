//! Sentiment aggregate and distribution endpoints
//!
//! Thin façade over the aggregator; both responses may be served from the
//! short-TTL cache.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use super::super::ApiState;
use crate::api::types::{ApiError, parse_timestamp_param, resolve_hours};
use crate::data::postgres::repositories::analytics::BucketPeriod;
use crate::domain::aggregator::{AggregateResponse, DistributionResponse};

#[derive(Debug, Deserialize)]
pub struct AggregateQuery {
    pub period: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub source: Option<String>,
}

/// Bucketed sentiment counts over a time range
pub async fn get_aggregate(
    State(state): State<ApiState>,
    Query(query): Query<AggregateQuery>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let period = BucketPeriod::parse(&query.period).ok_or_else(|| {
        ApiError::bad_request(
            "INVALID_PERIOD",
            format!("Invalid period '{}'. Valid: minute, hour, day", query.period),
        )
    })?;

    let start = parse_timestamp_param(&query.start_date)?;
    let end = parse_timestamp_param(&query.end_date)?;

    let response = state
        .aggregator
        .aggregate(period, start, end, query.source.as_deref())
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct DistributionQuery {
    pub hours: Option<i64>,
    pub source: Option<String>,
}

/// Sentiment distribution over the trailing hours
pub async fn get_distribution(
    State(state): State<ApiState>,
    Query(query): Query<DistributionQuery>,
) -> Result<Json<DistributionResponse>, ApiError> {
    let hours = resolve_hours(query.hours)?;

    let response = state
        .aggregator
        .distribution(hours, query.source.as_deref())
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(Json(response))
}
