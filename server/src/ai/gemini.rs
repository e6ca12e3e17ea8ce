//! Gemini `generateContent` client.

use super::service::{AiError, MoveSuggester};
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde_json::{json, Value};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl MoveSuggester for GeminiClient {
    async fn suggest(&self, prompt: &str) -> Result<String, AiError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2, "maxOutputTokens": 16 }
        });

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AiError::Unavailable(format!("unreadable response: {}", e)))?;
        debug!("Gemini replied: {}", payload);

        extract_text(&payload).ok_or_else(|| AiError::InvalidMove(String::new()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

pub fn classify_status(status: StatusCode, body: &str) -> AiError {
    let detail = format!("{} {}", status.as_u16(), body.trim());
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            AiError::Overloaded(detail)
        }
        s if s.is_server_error() => AiError::Unavailable(detail),
        _ => AiError::Rejected(detail),
    }
}

/// Concatenated text parts of the first candidate; `None` when blank.
pub fn extract_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
