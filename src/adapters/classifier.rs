//! HTTP client for the emotion classification service.
//!
//! Endpoint: POST <url> with `{"text": "..."}`
//! Response: a JSON object with at least `emotion`, e.g.
//! `{"emotion": "anxious", "score": 0.91}`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::EmotionClassifier;
use crate::domain::EmotionData;

/// Emotion classifier backed by an HTTP inference service
pub struct HttpEmotionClassifier {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

impl HttpEmotionClassifier {
    /// Create a new client
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Interpret a classifier response body
fn parse_prediction(body: Value) -> Result<EmotionData> {
    match body {
        Value::Object(fields) => Ok(EmotionData::new(fields)),
        other => anyhow::bail!("Classifier returned a non-object body: {}", other),
    }
}

#[async_trait]
impl EmotionClassifier for HttpEmotionClassifier {
    fn name(&self) -> &str {
        "http-classifier"
    }

    async fn predict(&self, text: &str) -> Result<EmotionData> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { text })
            .send()
            .await
            .with_context(|| format!("Failed to reach classifier at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Classifier error ({}): {}", status, text.trim());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse classifier response")?;

        parse_prediction(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_prediction_keeps_all_fields() {
        let data = parse_prediction(json!({ "emotion": "anxious", "score": 0.8 })).unwrap();
        assert_eq!(data.label(), "anxious");
        assert_eq!(data.fields().len(), 2);
    }

    #[test]
    fn test_parse_prediction_rejects_non_object() {
        assert!(parse_prediction(json!(["anxious"])).is_err());
        assert!(parse_prediction(json!("anxious")).is_err());
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(PredictRequest { text: "hello" }).unwrap();
        assert_eq!(body, json!({ "text": "hello" }));
    }

    #[test]
    fn test_classifier_creation() {
        let classifier = HttpEmotionClassifier::new("http://localhost:8001/predict").unwrap();
        assert_eq!(classifier.name(), "http-classifier");
        assert_eq!(classifier.endpoint(), "http://localhost:8001/predict");
    }
}
