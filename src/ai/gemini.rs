use serde::Serialize;
use serde_json::Value;

use super::{AiError, ProviderConfig, ProviderRequest, Secret};

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const TIMEOUT_SECS: u64 = 20;

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

pub fn build_request(
    prompt: &str,
    model: &str,
    config: &ProviderConfig,
) -> Result<ProviderRequest, AiError> {
    let endpoint = config.require_endpoint()?;
    // The key travels as a query parameter, so there is no keyless mode here.
    let key = config.credential_for_call()?.ok_or_else(|| {
        AiError::Configuration(format!("no API key configured for {}", config.kind))
    })?;

    let request = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part { text: prompt }],
        }],
    };

    let body = serde_json::to_value(&request)
        .map_err(|e| AiError::Configuration(format!("failed to encode request: {}", e)))?;

    Ok(ProviderRequest {
        url: endpoint.replace("{model}", model),
        bearer: None,
        query: vec![("key", Secret::new(key))],
        body,
        timeout: config.timeout,
    })
}

/// `candidates[0].content.parts[0].text`, trimmed. Any missing link surfaces the whole body.
pub fn parse_response(body: &Value) -> Result<String, AiError> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            tracing::warn!("Candidate response missing text path");
            AiError::format(body.to_string())
        })
}
