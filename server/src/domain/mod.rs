//! Domain logic
//!
//! - `classifier` - sentiment/emotion classification capability
//! - `pipeline` - stream consumer turning posts into analyses
//! - `aggregator` - cached aggregate and distribution queries
//! - `alerting` - sliding-window ratio alerter

pub mod aggregator;
pub mod alerting;
pub mod classifier;
pub mod pipeline;

pub use aggregator::AggregatorService;
pub use alerting::AlertMonitor;
pub use classifier::{Classifier, FallbackClassifier};
pub use pipeline::SentimentPipeline;
