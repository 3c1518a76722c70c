//! Alert repository for PostgreSQL operations
//!
//! Alerts are append-only: rows are inserted by the monitor and never
//! updated.

use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::types::NewAlert;

/// Persist an alert, returning its primary key
pub async fn save_alert(pool: &PgPool, alert: &NewAlert) -> Result<i64, PostgresError> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO alerts
            (alert_type, threshold_value, actual_value, window_start, window_end,
             post_count, details, triggered_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&alert.alert_type)
    .bind(alert.threshold_value)
    .bind(alert.actual_value)
    .bind(alert.window_start)
    .bind(alert.window_end)
    .bind(alert.post_count)
    .bind(&alert.details)
    .bind(alert.triggered_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
