//! Real-time social-media sentiment analytics server
//!
//! Posts arrive on a durable stream, are enriched with sentiment and emotion
//! labels by a worker pipeline, persisted to PostgreSQL, and surfaced through
//! cached aggregates, a WebSocket push channel, and a threshold alerter.

pub mod api;
mod app;
pub mod core;
pub mod data;
pub mod domain;
