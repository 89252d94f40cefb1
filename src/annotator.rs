use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{BatchRequest, ChatMessage};

pub const DEFAULT_MAX_TOKENS: u32 = 50;

#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("{status} {reason}: {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("response has no choices[0].message.content")]
    MissingContent,
}

/// Produces the raw answer text for one batch request.
pub trait Annotator {
    fn annotate(&self, request: &BatchRequest) -> Result<String, AnnotatorError>;
}

/// Sampling settings sent with every request; forwarded as-is.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    pub default_max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.9,
            top_p: 1.0,
            top_k: 40,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }
}

/// Chat-completions body; the tuple request's `stream` flag is not forwarded.
#[derive(Debug, Serialize)]
pub struct CompletionPayload<'a> {
    model: &'a str,
    max_tokens: u32,
    top_p: f64,
    top_k: u32,
    presence_penalty: f64,
    frequency_penalty: f64,
    temperature: f64,
    messages: &'a [ChatMessage],
}

pub fn completion_payload<'a>(
    request: &'a BatchRequest,
    params: &GenerationParams,
) -> CompletionPayload<'a> {
    CompletionPayload {
        model: &request.body.model,
        max_tokens: request.body.max_tokens.unwrap_or(params.default_max_tokens),
        top_p: params.top_p,
        top_k: params.top_k,
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        temperature: params.temperature,
        messages: &request.body.messages,
    }
}

pub fn extract_content(response: &Value) -> Result<String, AnnotatorError> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|content| content.trim().to_string())
        .ok_or(AnnotatorError::MissingContent)
}

pub struct HttpAnnotator {
    client: Client,
    api_url: String,
    api_key: String,
    params: GenerationParams,
}

impl HttpAnnotator {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        params: GenerationParams,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            params,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

impl Annotator for HttpAnnotator {
    fn annotate(&self, request: &BatchRequest) -> Result<String, AnnotatorError> {
        let payload = completion_payload(request, &self.params);

        let response = self
            .client
            .post(&self.api_url)
            .header("Accept", "application/json")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| AnnotatorError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnnotatorError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }

        let json = response
            .json::<Value>()
            .map_err(|err| AnnotatorError::Transport(err.to_string()))?;
        extract_content(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::RequestBody;

    fn request(max_tokens: Option<u32>) -> BatchRequest {
        BatchRequest {
            custom_id: "tuple-1".to_string(),
            method: "POST".to_string(),
            url: "https://api.example.test/v1/chat/completions".to_string(),
            body: RequestBody {
                model: "deepseek-v3".to_string(),
                messages: vec![ChatMessage::system("sys"), ChatMessage::user("prompt")],
                max_tokens,
                stream: false,
            },
        }
    }

    #[test]
    fn completion_payload_passes_generation_params_through() {
        let request = request(Some(150));
        let payload = serde_json::to_value(completion_payload(&request, &GenerationParams::default()))
            .expect("payload");

        assert_eq!(payload["model"], "deepseek-v3");
        assert_eq!(payload["max_tokens"], 150);
        assert_eq!(payload["top_k"], 40);
        assert_eq!(payload["top_p"], 1.0);
        assert_eq!(payload["presence_penalty"], 0.0);
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"][1]["content"], "prompt");
        assert!(payload.get("stream").is_none());
    }

    #[test]
    fn completion_payload_falls_back_to_default_max_tokens() {
        let request = request(None);
        let payload = serde_json::to_value(completion_payload(&request, &GenerationParams::default()))
            .expect("payload");
        assert_eq!(payload["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn extract_content_trims_first_choice() {
        let response = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  {\"Best\": 1, \"Worst\": 2}\n"}}]
        });
        assert_eq!(
            extract_content(&response).expect("content"),
            "{\"Best\": 1, \"Worst\": 2}"
        );
    }

    #[test]
    fn extract_content_rejects_empty_choices() {
        let response = serde_json::json!({"choices": []});
        assert!(matches!(
            extract_content(&response),
            Err(AnnotatorError::MissingContent)
        ));
    }
}
