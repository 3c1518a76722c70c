//! Posts listing endpoint

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::ApiState;
use crate::api::types::{ApiError, parse_timestamp_param, resolve_limit};
use crate::data::postgres::repositories::posts::{self, PostFilters};
use crate::data::types::{PostWithAnalysis, SentimentLabel};

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub source: Option<String>,
    pub sentiment: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Serialize)]
pub struct PostsResponse {
    pub posts: Vec<PostWithAnalysis>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
    pub filters: PostsFilterEcho,
}

#[derive(Serialize)]
pub struct PostsFilterEcho {
    pub source: Option<String>,
    pub sentiment: Option<SentimentLabel>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// List posts with their analyses, newest first
///
/// Posts not yet processed by the pipeline appear with `sentiment: null`.
pub async fn get_posts(
    State(state): State<ApiState>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<PostsResponse>, ApiError> {
    let limit = resolve_limit(query.limit)?;
    let offset = query.offset.unwrap_or(0);

    let sentiment = match &query.sentiment {
        Some(s) => Some(SentimentLabel::parse(s).ok_or_else(|| {
            ApiError::bad_request(
                "INVALID_SENTIMENT",
                format!("Invalid sentiment '{}'. Valid: positive, negative, neutral", s),
            )
        })?),
        None => None,
    };

    let start_date = parse_timestamp_param(&query.start_date)?;
    let end_date = parse_timestamp_param(&query.end_date)?;

    let filters = PostFilters {
        source: query.source.clone(),
        sentiment,
        start_date,
        end_date,
    };

    let (posts, total) = posts::list_posts(state.database.pool(), &filters, limit, offset)
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(Json(PostsResponse {
        posts,
        total,
        limit,
        offset,
        filters: PostsFilterEcho {
            source: query.source,
            sentiment,
            start_date,
            end_date,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_echo_serializes_nulls() {
        let echo = PostsFilterEcho {
            source: None,
            sentiment: None,
            start_date: None,
            end_date: None,
        };
        let value = serde_json::to_value(&echo).unwrap();
        assert!(value["source"].is_null());
        assert!(value["sentiment"].is_null());
    }

    #[test]
    fn test_filter_echo_serializes_sentiment_lowercase() {
        let echo = PostsFilterEcho {
            source: Some("twitter".to_string()),
            sentiment: Some(SentimentLabel::Negative),
            start_date: None,
            end_date: None,
        };
        let value = serde_json::to_value(&echo).unwrap();
        assert_eq!(value["sentiment"], "negative");
        assert_eq!(value["source"], "twitter");
    }
}
