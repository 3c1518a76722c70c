//! Repository functions over the PostgreSQL pool

pub mod alerts;
pub mod analytics;
pub mod posts;
