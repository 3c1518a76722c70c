//! Data storage layer
//!
//! Provides the storage services for the application:
//! - `postgres` - durable store for posts, analyses, and alerts
//! - `cache` - in-memory and Redis caching for aggregate responses
//! - `topics` - stream (at-least-once) and pub/sub (broadcast) messaging
//! - `types` - typed records shared across all layers

pub mod cache;
pub mod postgres;
pub mod topics;
pub mod types;

pub use postgres::PostgresService;
