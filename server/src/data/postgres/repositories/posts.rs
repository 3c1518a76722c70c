//! Post repository for PostgreSQL operations

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::types::{
    AnalysisSummary, Emotion, EmotionResult, IncomingPost, PostWithAnalysis, SentimentLabel,
    SentimentResult,
};

/// Persist a post and its analysis in a single transaction
///
/// Idempotent per `post_id`:
/// - A duplicate post only refreshes `ingested_at`.
/// - An existing analysis row is left unchanged (no re-analysis).
///
/// Returns (post_pk, analysis_pk). Rolls back on any error.
pub async fn upsert_post_and_analysis(
    pool: &PgPool,
    post: &IncomingPost,
    sentiment: &SentimentResult,
    emotion: Option<&EmotionResult>,
    analyzed_at: DateTime<Utc>,
) -> Result<(i64, i64), PostgresError> {
    let mut tx = pool.begin().await?;

    let (post_pk,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO posts (post_id, source, content, author, created_at, ingested_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (post_id) DO UPDATE SET ingested_at = now()
        RETURNING id
        "#,
    )
    .bind(&post.post_id)
    .bind(&post.source)
    .bind(&post.content)
    .bind(&post.author)
    .bind(post.created_at)
    .fetch_one(&mut *tx)
    .await?;

    // Insert-if-absent; the returning row is the surviving analysis either way
    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO analyses
            (post_id, model_name, sentiment_label, confidence_score, emotion, analyzed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (post_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&post.post_id)
    .bind(&sentiment.model_name)
    .bind(sentiment.sentiment_label.as_str())
    .bind(sentiment.confidence_score)
    .bind(emotion.map(|e| e.emotion.as_str()))
    .bind(analyzed_at)
    .fetch_optional(&mut *tx)
    .await?;

    let analysis_pk = match inserted {
        Some((id,)) => id,
        None => {
            let (id,): (i64,) = sqlx::query_as("SELECT id FROM analyses WHERE post_id = $1")
                .bind(&post.post_id)
                .fetch_one(&mut *tx)
                .await?;
            id
        }
    };

    tx.commit().await?;
    Ok((post_pk, analysis_pk))
}

/// Filters accepted by the posts listing
#[derive(Debug, Clone, Default)]
pub struct PostFilters {
    pub source: Option<String>,
    pub sentiment: Option<SentimentLabel>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// List posts with their analyses (left outer join), newest first
///
/// Posts whose analysis has not landed yet appear with `sentiment: None`.
/// Returns the page plus the total row count for the filter set.
pub async fn list_posts(
    pool: &PgPool,
    filters: &PostFilters,
    limit: u32,
    offset: u32,
) -> Result<(Vec<PostWithAnalysis>, i64), PostgresError> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut bind_idx = 0u32;

    if filters.source.is_some() {
        bind_idx += 1;
        where_clauses.push(format!("p.source = ${}", bind_idx));
    }
    if filters.sentiment.is_some() {
        bind_idx += 1;
        where_clauses.push(format!("a.sentiment_label = ${}", bind_idx));
    }
    if filters.start_date.is_some() {
        bind_idx += 1;
        where_clauses.push(format!("p.created_at >= ${}", bind_idx));
    }
    if filters.end_date.is_some() {
        bind_idx += 1;
        where_clauses.push(format!("p.created_at <= ${}", bind_idx));
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let base = format!(
        r#"
        FROM posts p
        LEFT OUTER JOIN analyses a ON a.post_id = p.post_id
        {}
        "#,
        where_sql
    );

    let count_sql = format!("SELECT COUNT(*) {}", base);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref source) = filters.source {
        count_query = count_query.bind(source);
    }
    if let Some(sentiment) = filters.sentiment {
        count_query = count_query.bind(sentiment.as_str());
    }
    if let Some(start) = filters.start_date {
        count_query = count_query.bind(start);
    }
    if let Some(end) = filters.end_date {
        count_query = count_query.bind(end);
    }
    let (total,) = count_query.fetch_one(pool).await?;

    let rows_sql = format!(
        r#"
        SELECT p.post_id, p.source, p.content, p.author, p.created_at,
               a.sentiment_label, a.confidence_score, a.emotion, a.model_name
        {}
        ORDER BY p.created_at DESC
        LIMIT ${} OFFSET ${}
        "#,
        base,
        bind_idx + 1,
        bind_idx + 2
    );

    type PostRow = (
        String,
        String,
        String,
        String,
        DateTime<Utc>,
        Option<String>,
        Option<f64>,
        Option<String>,
        Option<String>,
    );

    let mut rows_query = sqlx::query_as::<_, PostRow>(&rows_sql);
    if let Some(ref source) = filters.source {
        rows_query = rows_query.bind(source);
    }
    if let Some(sentiment) = filters.sentiment {
        rows_query = rows_query.bind(sentiment.as_str());
    }
    if let Some(start) = filters.start_date {
        rows_query = rows_query.bind(start);
    }
    if let Some(end) = filters.end_date {
        rows_query = rows_query.bind(end);
    }
    rows_query = rows_query.bind(limit as i64).bind(offset as i64);

    let rows = rows_query.fetch_all(pool).await?;

    let posts = rows
        .into_iter()
        .map(
            |(post_id, source, content, author, created_at, label, confidence, emotion, model)| {
                let sentiment = match (label, confidence, model) {
                    (Some(label), Some(confidence), Some(model_name)) => {
                        SentimentLabel::parse(&label).map(|label| AnalysisSummary {
                            label,
                            confidence,
                            emotion: emotion.as_deref().and_then(Emotion::parse),
                            model_name,
                        })
                    }
                    _ => None,
                };
                PostWithAnalysis {
                    post_id,
                    source,
                    content,
                    author,
                    created_at,
                    sentiment,
                }
            },
        )
        .collect();

    Ok((posts, total))
}

/// Basic health counters for the health endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub total_posts: i64,
    pub total_analyses: i64,
    pub recent_posts_1h: i64,
}

/// Count posts, analyses, and posts created in the last hour
pub async fn store_stats(pool: &PgPool) -> Result<StoreStats, PostgresError> {
    let (total_posts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    let (total_analyses,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analyses")
        .fetch_one(pool)
        .await?;
    let (recent_posts_1h,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM posts WHERE created_at >= now() - interval '1 hour'")
            .fetch_one(pool)
            .await?;

    Ok(StoreStats {
        total_posts,
        total_analyses,
        recent_posts_1h,
    })
}
