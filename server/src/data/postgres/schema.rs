//! PostgreSQL schema definitions
//!
//! All timestamps are TIMESTAMPTZ and stored in UTC. `analyses.post_id`
//! joins on the natural key `posts.post_id`; deleting a post cascades to
//! its analysis. Alerts are append-only.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initial schema
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS posts (
    id BIGSERIAL PRIMARY KEY,
    post_id TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_posts_source ON posts (source);
CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts (created_at);

CREATE TABLE IF NOT EXISTS analyses (
    id BIGSERIAL PRIMARY KEY,
    post_id TEXT NOT NULL UNIQUE REFERENCES posts (post_id) ON DELETE CASCADE,
    model_name TEXT NOT NULL,
    sentiment_label TEXT NOT NULL
        CHECK (sentiment_label IN ('positive', 'negative', 'neutral')),
    confidence_score DOUBLE PRECISION NOT NULL
        CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
    emotion TEXT
        CHECK (emotion IN ('joy', 'sadness', 'anger', 'fear', 'surprise', 'neutral')),
    analyzed_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyses_analyzed_at ON analyses (analyzed_at);
CREATE INDEX IF NOT EXISTS idx_analyses_sentiment ON analyses (sentiment_label);

CREATE TABLE IF NOT EXISTS alerts (
    id BIGSERIAL PRIMARY KEY,
    alert_type TEXT NOT NULL,
    threshold_value DOUBLE PRECISION NOT NULL,
    actual_value DOUBLE PRECISION NOT NULL,
    window_start TIMESTAMPTZ NOT NULL,
    window_end TIMESTAMPTZ NOT NULL,
    post_count BIGINT NOT NULL,
    details JSONB NOT NULL,
    triggered_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_triggered_at ON alerts (triggered_at);
"#;
