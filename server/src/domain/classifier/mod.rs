//! Sentiment/emotion classifier capability
//!
//! The pipeline treats classification as an opaque capability with two
//! implementations selected by configuration:
//! - `local`: deterministic in-process lexicon scorer
//! - `external`: OpenAI-compatible chat-completions API over HTTP
//!
//! The worker always talks to a [`FallbackClassifier`] that tries the
//! primary and falls back to the secondary on failure.

mod external;
mod lexicon;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use external::ExternalClassifier;
pub use lexicon::LexiconClassifier;

use crate::core::config::{ClassifierConfig, ClassifierMode};
use crate::data::types::{EmotionResult, SentimentResult};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier request timed out")]
    Timeout,

    #[error("Classifier returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Classifier configuration error: {0}")]
    Config(String),
}

/// Classifier capability: text in, labels out
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the sentiment of a text
    async fn sentiment(&self, text: &str) -> Result<SentimentResult, ClassifierError>;

    /// Detect the dominant emotion of a text
    async fn emotion(&self, text: &str) -> Result<EmotionResult, ClassifierError>;

    /// Classify a batch of texts; per-text failures do not abort the batch
    async fn batch(&self, texts: &[String]) -> Vec<Result<SentimentResult, ClassifierError>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.sentiment(text).await);
        }
        results
    }

    /// Implementation name for logging
    fn name(&self) -> &'static str;
}

/// Composite classifier: primary with optional secondary fallback
///
/// A primary failure is logged and retried on the secondary; a secondary
/// failure (or a primary failure with no secondary) propagates so the
/// worker can leave the entry for redelivery.
pub struct FallbackClassifier {
    primary: Arc<dyn Classifier>,
    secondary: Option<Arc<dyn Classifier>>,
}

impl FallbackClassifier {
    pub fn new(primary: Arc<dyn Classifier>, secondary: Option<Arc<dyn Classifier>>) -> Self {
        Self { primary, secondary }
    }

    /// Build the classifier stack from configuration
    ///
    /// - `local` mode: lexicon primary; the external classifier becomes the
    ///   secondary when fully configured.
    /// - `external` mode: external primary, lexicon secondary.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let lexicon: Arc<dyn Classifier> = Arc::new(LexiconClassifier::new(&config.model));

        match config.mode {
            ClassifierMode::Local => {
                let secondary = match ExternalClassifier::from_config(config) {
                    Ok(external) => Some(Arc::new(external) as Arc<dyn Classifier>),
                    Err(_) => None,
                };
                Ok(Self::new(lexicon, secondary))
            }
            ClassifierMode::External => {
                let external: Arc<dyn Classifier> =
                    Arc::new(ExternalClassifier::from_config(config)?);
                Ok(Self::new(external, Some(lexicon)))
            }
        }
    }
}

#[async_trait]
impl Classifier for FallbackClassifier {
    async fn sentiment(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        match self.primary.sentiment(text).await {
            Ok(result) => Ok(result),
            Err(e) => match &self.secondary {
                Some(secondary) => {
                    tracing::warn!(
                        error = %e,
                        primary = self.primary.name(),
                        secondary = secondary.name(),
                        "Primary sentiment classifier failed, trying secondary"
                    );
                    secondary.sentiment(text).await
                }
                None => Err(e),
            },
        }
    }

    async fn emotion(&self, text: &str) -> Result<EmotionResult, ClassifierError> {
        match self.primary.emotion(text).await {
            Ok(result) => Ok(result),
            Err(e) => match &self.secondary {
                Some(secondary) => {
                    tracing::warn!(
                        error = %e,
                        primary = self.primary.name(),
                        secondary = secondary.name(),
                        "Primary emotion classifier failed, trying secondary"
                    );
                    secondary.emotion(text).await
                }
                None => Err(e),
            },
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{Emotion, SentimentLabel};

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn sentiment(&self, _text: &str) -> Result<SentimentResult, ClassifierError> {
            Err(ClassifierError::Timeout)
        }

        async fn emotion(&self, _text: &str) -> Result<EmotionResult, ClassifierError> {
            Err(ClassifierError::Timeout)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct FixedClassifier;

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn sentiment(&self, _text: &str) -> Result<SentimentResult, ClassifierError> {
            Ok(SentimentResult {
                sentiment_label: SentimentLabel::Positive,
                confidence_score: 0.9,
                model_name: "fixed".to_string(),
            })
        }

        async fn emotion(&self, _text: &str) -> Result<EmotionResult, ClassifierError> {
            Ok(EmotionResult {
                emotion: Emotion::Joy,
                confidence_score: 0.8,
                model_name: "fixed".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_fallback_uses_secondary_on_primary_failure() {
        let composite =
            FallbackClassifier::new(Arc::new(FailingClassifier), Some(Arc::new(FixedClassifier)));

        let sentiment = composite.sentiment("anything").await.unwrap();
        assert_eq!(sentiment.sentiment_label, SentimentLabel::Positive);
        assert_eq!(sentiment.model_name, "fixed");

        let emotion = composite.emotion("anything").await.unwrap();
        assert_eq!(emotion.emotion, Emotion::Joy);
    }

    #[tokio::test]
    async fn test_fallback_prefers_primary() {
        let composite =
            FallbackClassifier::new(Arc::new(FixedClassifier), Some(Arc::new(FailingClassifier)));

        let sentiment = composite.sentiment("anything").await.unwrap();
        assert_eq!(sentiment.model_name, "fixed");
    }

    #[tokio::test]
    async fn test_fallback_without_secondary_propagates() {
        let composite = FallbackClassifier::new(Arc::new(FailingClassifier), None);
        assert!(composite.sentiment("anything").await.is_err());
        assert!(composite.emotion("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_both_failing_propagates() {
        let composite = FallbackClassifier::new(
            Arc::new(FailingClassifier),
            Some(Arc::new(FailingClassifier)),
        );
        assert!(composite.sentiment("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_batch_default_impl() {
        let classifier = FixedClassifier;
        let texts = vec!["a".to_string(), "b".to_string()];
        let results = classifier.batch(&texts).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
