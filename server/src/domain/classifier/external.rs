//! External LLM classifier
//!
//! Calls an OpenAI-compatible chat-completions endpoint with a bearer key.
//! The model is asked to answer with a single JSON object; anything else is
//! an invalid response, which the composite classifier turns into a
//! fallback to the lexicon scorer.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Classifier, ClassifierError};
use crate::core::config::ClassifierConfig;
use crate::data::types::{Emotion, EmotionResult, SentimentLabel, SentimentResult};

/// Default endpoint when none is configured
const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// External classifier over HTTP
pub struct ExternalClassifier {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct SentimentAnswer {
    sentiment: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct EmotionAnswer {
    emotion: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl ExternalClassifier {
    /// Build from configuration; requires an API key and model name
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let api_key = config
            .external_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ClassifierError::Config("EXTERNAL_LLM_API_KEY is not set".into()))?;
        let model = config
            .external_model
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ClassifierError::Config("EXTERNAL_LLM_MODEL is not set".into()))?;
        let url = config
            .external_url
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key,
            model,
        })
    }

    /// Send a prompt and return the assistant message content
    async fn complete(&self, prompt: String) -> Result<String, ClassifierError> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::Request(e.to_string())
                }
            })?;

        let response = response
            .error_for_status()
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ClassifierError::InvalidResponse("no choices in response".into()))
    }
}

/// Extract the first JSON object from a completion, tolerating code fences
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[async_trait]
impl Classifier for ExternalClassifier {
    async fn sentiment(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        let prompt = format!(
            "Classify the sentiment of the following text as positive, negative, \
             or neutral. Answer with JSON only, like \
             {{\"sentiment\": \"positive\", \"confidence\": 0.9}}.\n\nText: {text}"
        );

        let content = self.complete(prompt).await?;
        let raw = extract_json(&content)
            .ok_or_else(|| ClassifierError::InvalidResponse(content.clone()))?;
        let answer: SentimentAnswer = serde_json::from_str(raw)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        let label = SentimentLabel::parse(&answer.sentiment.to_lowercase())
            .ok_or_else(|| ClassifierError::InvalidResponse(answer.sentiment.clone()))?;

        Ok(SentimentResult {
            sentiment_label: label,
            confidence_score: answer.confidence.clamp(0.0, 1.0),
            model_name: self.model.clone(),
        })
    }

    async fn emotion(&self, text: &str) -> Result<EmotionResult, ClassifierError> {
        let prompt = format!(
            "Detect the strongest emotion in the following text from: joy, sadness, \
             anger, fear, surprise, neutral. Answer with JSON only, like \
             {{\"emotion\": \"joy\", \"confidence\": 0.8}}.\n\nText: {text}"
        );

        let content = self.complete(prompt).await?;
        let raw = extract_json(&content)
            .ok_or_else(|| ClassifierError::InvalidResponse(content.clone()))?;
        let answer: EmotionAnswer = serde_json::from_str(raw)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        let emotion = Emotion::parse(&answer.emotion.to_lowercase())
            .ok_or_else(|| ClassifierError::InvalidResponse(answer.emotion.clone()))?;

        Ok(EmotionResult {
            emotion,
            confidence_score: answer.confidence.clamp(0.0, 1.0),
            model_name: self.model.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "external"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ClassifierMode;

    fn config(key: Option<&str>, model: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            mode: ClassifierMode::External,
            model: "lexicon-sentiment-en-v1".to_string(),
            external_url: None,
            external_api_key: key.map(|k| k.to_string()),
            external_model: model.map(|m| m.to_string()),
            timeout_secs: 15,
        }
    }

    #[test]
    fn test_from_config_requires_key_and_model() {
        assert!(ExternalClassifier::from_config(&config(None, Some("m"))).is_err());
        assert!(ExternalClassifier::from_config(&config(Some("k"), None)).is_err());
        assert!(ExternalClassifier::from_config(&config(Some("k"), Some("m"))).is_ok());
    }

    #[test]
    fn test_from_config_uses_default_endpoint() {
        let classifier = ExternalClassifier::from_config(&config(Some("k"), Some("m"))).unwrap();
        assert_eq!(classifier.url, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(
            extract_json(r#"{"sentiment": "positive"}"#),
            Some(r#"{"sentiment": "positive"}"#)
        );
    }

    #[test]
    fn test_extract_json_fenced() {
        let content = "```json\n{\"sentiment\": \"negative\", \"confidence\": 0.8}\n```";
        let raw = extract_json(content).unwrap();
        let answer: SentimentAnswer = serde_json::from_str(raw).unwrap();
        assert_eq!(answer.sentiment, "negative");
        assert_eq!(answer.confidence, 0.8);
    }

    #[test]
    fn test_extract_json_missing() {
        assert_eq!(extract_json("positive"), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_answer_defaults_confidence() {
        let answer: SentimentAnswer = serde_json::from_str(r#"{"sentiment": "neutral"}"#).unwrap();
        assert_eq!(answer.confidence, 0.5);
    }
}
