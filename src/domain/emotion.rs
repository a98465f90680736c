//! Emotion classification output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label used when the classifier didn't provide one
pub const NEUTRAL: &str = "neutral";

/// Output of the emotion classifier
///
/// Kept as an open JSON object so whatever the classifier returns reaches the
/// generator unchanged. Only the `emotion` key is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionData(Map<String, Value>);

impl EmotionData {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build data carrying only an `emotion` label
    pub fn from_label(label: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("emotion".to_string(), Value::String(label.into()));
        Self(fields)
    }

    /// The `emotion` label, or "neutral" if missing or not a string
    pub fn label(&self) -> &str {
        self.0
            .get("emotion")
            .and_then(Value::as_str)
            .unwrap_or(NEUTRAL)
    }

    /// Confidence score for the label, if the classifier sent one
    pub fn score(&self) -> Option<f64> {
        self.0
            .get("score")
            .or_else(|| self.0.get("confidence"))
            .and_then(Value::as_f64)
    }

    /// Per-label scores (`scores: {label: f64}`), if present
    pub fn scores(&self) -> Vec<(String, f64)> {
        self.0
            .get("scores")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_f64().map(|s| (k.clone(), s)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}
