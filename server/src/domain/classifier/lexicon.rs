//! Lexicon-based local classifier
//!
//! Deterministic in-process scorer over sentiment and emotion word lists.
//! No model download, no network: suitable as the default pipeline
//! classifier and as the fallback when the external API is unreachable.
//!
//! Edge behavior mirrors the pipeline contract:
//! - blank text → neutral, confidence 0.0, model `none`
//! - text shorter than 10 chars → emotion neutral, confidence 0.0,
//!   model `rule-based`

use async_trait::async_trait;

use super::{Classifier, ClassifierError};
use crate::data::types::{Emotion, EmotionResult, SentimentLabel, SentimentResult};

const POSITIVE_WORDS: &[&str] = &[
    "amazing",
    "awesome",
    "brilliant",
    "delighted",
    "enjoy",
    "excellent",
    "fantastic",
    "glad",
    "good",
    "great",
    "happy",
    "impressed",
    "love",
    "loved",
    "perfect",
    "pleased",
    "recommend",
    "satisfied",
    "superb",
    "thrilled",
    "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry",
    "annoyed",
    "awful",
    "bad",
    "broken",
    "disappointed",
    "disappointing",
    "dreadful",
    "frustrated",
    "hate",
    "hated",
    "horrible",
    "poor",
    "poorly",
    "refund",
    "terrible",
    "unacceptable",
    "unusable",
    "useless",
    "waste",
    "worst",
];

const EMOTION_KEYWORDS: &[(Emotion, &[&str])] = &[
    (
        Emotion::Joy,
        &["love", "great", "happy", "amazing", "wonderful", "delighted", "enjoy", "fantastic"],
    ),
    (
        Emotion::Sadness,
        &["sad", "unhappy", "miss", "cry", "lonely", "heartbroken", "disappointed"],
    ),
    (
        Emotion::Anger,
        &["hate", "angry", "furious", "outraged", "annoyed", "unacceptable", "worst"],
    ),
    (
        Emotion::Fear,
        &["afraid", "scared", "worried", "anxious", "terrified", "nervous"],
    ),
    (
        Emotion::Surprise,
        &["wow", "unexpected", "surprised", "unbelievable", "shocking", "incredible"],
    ),
];

/// Minimum trimmed length for emotion scoring
const EMOTION_MIN_CHARS: usize = 10;

/// Lexicon-based classifier
pub struct LexiconClassifier {
    model_name: String,
}

impl LexiconClassifier {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    }

    fn score_sentiment(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult {
                sentiment_label: SentimentLabel::Neutral,
                confidence_score: 0.0,
                model_name: "none".to_string(),
            };
        }

        let tokens = Self::tokenize(text);
        let positive = tokens
            .iter()
            .filter(|t| POSITIVE_WORDS.contains(&t.as_str()))
            .count() as i64;
        let negative = tokens
            .iter()
            .filter(|t| NEGATIVE_WORDS.contains(&t.as_str()))
            .count() as i64;

        let matched = positive + negative;
        let (label, confidence) = if matched == 0 {
            // No signal either way
            (SentimentLabel::Neutral, 0.6)
        } else {
            let diff = (positive - negative).abs();
            let confidence = 0.5 + 0.45 * diff as f64 / matched as f64;
            let label = match positive.cmp(&negative) {
                std::cmp::Ordering::Greater => SentimentLabel::Positive,
                std::cmp::Ordering::Less => SentimentLabel::Negative,
                std::cmp::Ordering::Equal => SentimentLabel::Neutral,
            };
            (label, confidence)
        };

        SentimentResult {
            sentiment_label: label,
            confidence_score: round4(confidence),
            model_name: self.model_name.clone(),
        }
    }

    fn score_emotion(&self, text: &str) -> EmotionResult {
        if text.trim().len() < EMOTION_MIN_CHARS {
            return EmotionResult {
                emotion: Emotion::Neutral,
                confidence_score: 0.0,
                model_name: "rule-based".to_string(),
            };
        }

        let tokens = Self::tokenize(text);
        let mut best = (Emotion::Neutral, 0usize);
        let mut total_matches = 0usize;

        for (emotion, keywords) in EMOTION_KEYWORDS {
            let count = tokens
                .iter()
                .filter(|t| keywords.contains(&t.as_str()))
                .count();
            total_matches += count;
            if count > best.1 {
                best = (*emotion, count);
            }
        }

        let (emotion, confidence) = if best.1 == 0 {
            (Emotion::Neutral, 0.5)
        } else {
            (best.0, 0.5 + 0.45 * best.1 as f64 / total_matches as f64)
        };

        EmotionResult {
            emotion,
            confidence_score: round4(confidence),
            model_name: self.model_name.clone(),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl Classifier for LexiconClassifier {
    async fn sentiment(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        Ok(self.score_sentiment(text))
    }

    async fn emotion(&self, text: &str) -> Result<EmotionResult, ClassifierError> {
        Ok(self.score_emotion(text))
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LexiconClassifier {
        LexiconClassifier::new("lexicon-sentiment-en-v1")
    }

    #[tokio::test]
    async fn test_positive_text() {
        let result = classifier().sentiment("I love it").await.unwrap();
        assert_eq!(result.sentiment_label, SentimentLabel::Positive);
        assert!(result.confidence_score > 0.5);
        assert!(result.confidence_score <= 1.0);
    }

    #[tokio::test]
    async fn test_negative_text() {
        let result = classifier().sentiment("This is terrible").await.unwrap();
        assert_eq!(result.sentiment_label, SentimentLabel::Negative);
        assert!(result.confidence_score > 0.5);
    }

    #[tokio::test]
    async fn test_no_signal_is_neutral() {
        let result = classifier().sentiment("ok").await.unwrap();
        assert_eq!(result.sentiment_label, SentimentLabel::Neutral);
        assert_eq!(result.confidence_score, 0.6);
    }

    #[tokio::test]
    async fn test_mixed_signal_is_neutral() {
        let result = classifier()
            .sentiment("I love the idea but hate the product")
            .await
            .unwrap();
        assert_eq!(result.sentiment_label, SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn test_blank_text() {
        let result = classifier().sentiment("   ").await.unwrap();
        assert_eq!(result.sentiment_label, SentimentLabel::Neutral);
        assert_eq!(result.confidence_score, 0.0);
        assert_eq!(result.model_name, "none");
    }

    #[tokio::test]
    async fn test_confidence_in_unit_interval() {
        for text in [
            "love love love great amazing",
            "terrible awful worst hate",
            "the quick brown fox",
            "",
        ] {
            let result = classifier().sentiment(text).await.unwrap();
            assert!(result.confidence_score >= 0.0);
            assert!(result.confidence_score <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_short_text_emotion_is_rule_based() {
        let result = classifier().emotion("meh").await.unwrap();
        assert_eq!(result.emotion, Emotion::Neutral);
        assert_eq!(result.confidence_score, 0.0);
        assert_eq!(result.model_name, "rule-based");
    }

    #[tokio::test]
    async fn test_emotion_detection() {
        let result = classifier()
            .emotion("I am so happy, I love this wonderful thing")
            .await
            .unwrap();
        assert_eq!(result.emotion, Emotion::Joy);
        assert!(result.confidence_score > 0.5);

        let result = classifier()
            .emotion("I hate this, absolutely furious right now")
            .await
            .unwrap();
        assert_eq!(result.emotion, Emotion::Anger);
    }

    #[tokio::test]
    async fn test_emotion_without_keywords_is_neutral() {
        let result = classifier()
            .emotion("The package arrived on schedule")
            .await
            .unwrap();
        assert_eq!(result.emotion, Emotion::Neutral);
        assert_eq!(result.confidence_score, 0.5);
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = LexiconClassifier::tokenize("I love it! Really, love.");
        assert_eq!(tokens, vec!["i", "love", "it", "really", "love"]);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(0.95), 0.95);
    }
}
