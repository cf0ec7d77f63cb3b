// src/services/llm_service.rs
use crate::config::{Config, VisionProvider};
use crate::errors::{ExtractionError, SkinReportError};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const MAX_TOKENS: u32 = 4096;

/// One page worth of visual content plus the instructions for it.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub page_number: u32,
    pub media_type: String,
    pub data: Bytes,
    pub prompt: String,
}

impl ExtractionRequest {
    fn is_pdf(&self) -> bool {
        self.media_type == "application/pdf"
    }

    fn base64_data(&self) -> String {
        general_purpose::STANDARD.encode(&self.data)
    }
}

/// A vision-language service that answers with the raw model text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &ExtractionRequest) -> Result<String, ExtractionError>;
}

pub fn client_from_config(config: &Config) -> Result<Arc<dyn InferenceClient>, SkinReportError> {
    let missing = |key: &str| SkinReportError::Config(format!("{} must be set", key));
    match config.provider {
        VisionProvider::OpenAi => {
            let key = config.openai_key.clone().ok_or_else(|| missing("OPENAI_API_KEY"))?;
            let model = config.model.clone().unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
            Ok(Arc::new(OpenAiClient::new(key, model)))
        }
        VisionProvider::Anthropic => {
            let key = config
                .anthropic_key
                .clone()
                .ok_or_else(|| missing("ANTHROPIC_API_KEY"))?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| ANTHROPIC_DEFAULT_MODEL.to_string());
            Ok(Arc::new(AnthropicClient::new(key, model)))
        }
    }
}

fn send_error(provider: &str, e: reqwest::Error) -> ExtractionError {
    ExtractionError::Transient(format!("{} request failed: {}", provider, e))
}

/// Rate limits and server errors are worth another attempt; other 4xx are final.
fn status_error(provider: &str, status: StatusCode, body: String) -> ExtractionError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ExtractionError::Transient(format!("{} returned {}: {}", provider, status, body))
    } else {
        ExtractionError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

async fn read_envelope(provider: &str, response: reqwest::Response) -> Result<Value, ExtractionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(provider, status, body));
    }
    response.json().await.map_err(|e| {
        ExtractionError::Transient(format!("Failed to parse {} response: {}", provider, e))
    })
}

pub struct OpenAiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: Client::new(),
        }
    }
}

pub(crate) fn openai_body(model: &str, request: &ExtractionRequest) -> Value {
    let encoded = request.base64_data();
    let visual = if request.is_pdf() {
        json!({
            "type": "file",
            "file": {
                "filename": format!("page-{}.pdf", request.page_number),
                "file_data": format!("data:application/pdf;base64,{}", encoded)
            }
        })
    } else {
        json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", request.media_type, encoded)
            }
        })
    };

    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": request.prompt },
                visual
            ]
        }],
        "max_tokens": MAX_TOKENS,
        "temperature": 0,
        "response_format": { "type": "json_object" }
    })
}

pub(crate) fn openai_content(envelope: &Value) -> Result<String, ExtractionError> {
    envelope["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::SchemaViolation("No content in OpenAI response".into()))
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&openai_body(&self.model, request))
            .send()
            .await
            .map_err(|e| send_error("OpenAI", e))?;

        let envelope = read_envelope("OpenAI", response).await?;
        openai_content(&envelope)
    }
}

pub struct AnthropicClient {
    api_key: String,
    model: String,
    client: Client,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: Client::new(),
        }
    }
}

pub(crate) fn anthropic_body(model: &str, request: &ExtractionRequest) -> Value {
    let block_type = if request.is_pdf() { "document" } else { "image" };
    json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "temperature": 0,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": block_type,
                    "source": {
                        "type": "base64",
                        "media_type": request.media_type,
                        "data": request.base64_data()
                    }
                },
                { "type": "text", "text": request.prompt }
            ]
        }]
    })
}

pub(crate) fn anthropic_content(envelope: &Value) -> Result<String, ExtractionError> {
    let text: String = envelope["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ExtractionError::SchemaViolation(
            "No content in Anthropic response".into(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl InferenceClient for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&anthropic_body(&self.model, request))
            .send()
            .await
            .map_err(|e| send_error("Anthropic", e))?;

        let envelope = read_envelope("Anthropic", response).await?;
        anthropic_content(&envelope)
    }
}
