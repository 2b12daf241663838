use serde::Serialize;
use serde_json::Value;

use super::{AiError, ProviderConfig, ProviderRequest, Secret};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const TIMEOUT_SECS: u64 = 15;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub fn build_request(
    prompt: &str,
    model: &str,
    config: &ProviderConfig,
) -> Result<ProviderRequest, AiError> {
    let url = config.require_endpoint()?;
    let key = config.credential_for_call()?;

    let request = ChatCompletionRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };

    let body = serde_json::to_value(&request)
        .map_err(|e| AiError::Configuration(format!("failed to encode request: {}", e)))?;

    Ok(ProviderRequest {
        url: url.to_string(),
        bearer: key.map(Secret::new),
        query: Vec::new(),
        body,
        timeout: config.timeout,
    })
}

/// `choices[0].message.content`, trimmed.
pub fn parse_response(body: &Value) -> Result<String, AiError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| AiError::format(body.to_string()))
}
