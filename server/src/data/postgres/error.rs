//! PostgreSQL error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration {version} failed: {error}")]
    MigrationFailed { version: i32, error: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PostgresError {
    /// True for unique/foreign-key violations, which make an entry poison
    /// rather than retryable (the row will never insert cleanly).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            PostgresError::Database(sqlx::Error::Database(db)) => {
                db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_error_display() {
        let err = PostgresError::MigrationFailed {
            version: 2,
            error: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "Migration 2 failed: syntax error");
    }

    #[test]
    fn test_config_error_display() {
        let err = PostgresError::Config("missing URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing URL");
    }

    #[test]
    fn test_non_database_error_is_not_constraint_violation() {
        let err = PostgresError::Config("x".to_string());
        assert!(!err.is_constraint_violation());
        let err = PostgresError::Database(sqlx::Error::RowNotFound);
        assert!(!err.is_constraint_violation());
    }
}
