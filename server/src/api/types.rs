//! Shared API types
//!
//! Common error handling and parameter parsing for all endpoints. Store
//! failures map to a generic 5xx body; internal error strings are logged,
//! never returned to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

/// Maximum items per page for the posts listing
pub const MAX_LIMIT: u32 = 100;
/// Default items per page
pub const DEFAULT_LIMIT: u32 = 50;
/// Maximum distribution timeframe in hours (one week)
pub const MAX_HOURS: i64 = 168;
/// Default distribution timeframe in hours
pub const DEFAULT_HOURS: i64 = 24;

/// Parse an optional timestamp string parameter (RFC 3339 / ISO 8601 format)
pub fn parse_timestamp_param(s: &Option<String>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match s {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| {
                ApiError::bad_request(
                    "INVALID_TIMESTAMP",
                    format!("Invalid timestamp format: {}. Use ISO 8601 format.", ts),
                )
            }),
        None => Ok(None),
    }
}

/// Validate a page limit, applying the default when absent
pub fn resolve_limit(limit: Option<u32>) -> Result<u32, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::bad_request(
            "INVALID_LIMIT",
            format!("limit must be between 1 and {}", MAX_LIMIT),
        ));
    }
    Ok(limit)
}

/// Validate a distribution timeframe, applying the default when absent
pub fn resolve_hours(hours: Option<i64>) -> Result<i64, ApiError> {
    let hours = hours.unwrap_or(DEFAULT_HOURS);
    if !(1..=MAX_HOURS).contains(&hours) {
        return Err(ApiError::bad_request(
            "INVALID_HOURS",
            format!("hours must be between 1 and {}", MAX_HOURS),
        ));
    }
    Ok(hours)
}

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn from_postgres(e: crate::data::postgres::PostgresError) -> Self {
        tracing::error!(error = %e, "PostgreSQL error");
        Self::Internal {
            message: "Database operation failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_param() {
        let parsed = parse_timestamp_param(&Some("2025-06-01T12:00:00Z".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T12:00:00+00:00");

        assert_eq!(parse_timestamp_param(&None).unwrap(), None);
        assert!(parse_timestamp_param(&Some("yesterday".to_string())).is_err());
    }

    #[test]
    fn test_resolve_limit_bounds() {
        assert_eq!(resolve_limit(None).unwrap(), DEFAULT_LIMIT);
        assert_eq!(resolve_limit(Some(1)).unwrap(), 1);
        assert_eq!(resolve_limit(Some(100)).unwrap(), 100);
        assert!(resolve_limit(Some(0)).is_err());
        assert!(resolve_limit(Some(101)).is_err());
    }

    #[test]
    fn test_resolve_hours_bounds() {
        assert_eq!(resolve_hours(None).unwrap(), DEFAULT_HOURS);
        assert_eq!(resolve_hours(Some(1)).unwrap(), 1);
        assert_eq!(resolve_hours(Some(168)).unwrap(), 168);
        assert!(resolve_hours(Some(0)).is_err());
        assert!(resolve_hours(Some(169)).is_err());
    }
}
