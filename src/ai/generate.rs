//! Generate-style adapter for local or self-hosted endpoints (Ollama and friends).
//!
//! These servers disagree on where the text lives, so parsing probes a list of
//! known fields and falls back to the raw body instead of failing.

use serde_json::{json, Value};

use super::{AiError, ProviderConfig, ProviderRequest, Secret};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_MODEL: &str = "gemma";
pub const TIMEOUT_SECS: u64 = 20;

const TEXT_KEYS: [&str; 4] = ["text", "response", "result", "output"];

pub fn build_request(
    prompt: &str,
    model: &str,
    config: &ProviderConfig,
) -> Result<ProviderRequest, AiError> {
    let url = config.require_endpoint()?;
    let key = config.credential_for_call()?;

    let body = if config.compact_body {
        json!({ "prompt": prompt })
    } else {
        json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": config.temperature,
                "max_tokens": config.max_tokens,
            },
        })
    };

    Ok(ProviderRequest {
        url: url.to_string(),
        bearer: key.map(Secret::new),
        query: Vec::new(),
        body,
        timeout: config.timeout,
    })
}

/// Never fails: an unrecognized body comes back as its JSON text.
pub fn parse_response(body: &Value) -> Result<String, AiError> {
    if let Some(text) = probe_text_keys(body) {
        return Ok(text);
    }

    if let Some(choice) = body.pointer("/choices/0") {
        let text = choice
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .or_else(|| choice.pointer("/message/content").and_then(Value::as_str))
            .unwrap_or("");
        return Ok(text.trim().to_string());
    }

    tracing::debug!("Generate response had no known text field, returning raw body");
    Ok(body.to_string())
}

fn probe_text_keys(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    for key in TEXT_KEYS {
        match object.get(key) {
            Some(Value::String(text)) => return Some(text.trim().to_string()),
            Some(Value::Array(items)) if !items.is_empty() => {
                let first = match &items[0] {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                return Some(first.trim().to_string());
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig::new(ProviderKind::Gemma).with_credential("local-key")
    }

    #[test]
    fn test_full_body() {
        let request = build_request("Hello", "gemma", &config()).unwrap();
        assert_eq!(request.url, DEFAULT_ENDPOINT);
        assert_eq!(request.body["model"], "gemma");
        assert_eq!(request.body["prompt"], "Hello");
        assert_eq!(request.body["stream"], false);
        assert_eq!(request.body["options"]["max_tokens"], 512);
        assert_eq!(request.body["options"]["temperature"], json!(0.7));
    }

    #[test]
    fn test_compact_body() {
        let mut config = config();
        config.compact_body = true;
        let request = build_request("Hello", "gemma", &config).unwrap();
        assert_eq!(request.body, json!({"prompt": "Hello"}));
    }

    #[test]
    fn test_keyless_when_allowed() {
        let mut config = ProviderConfig::new(ProviderKind::Gemma);
        config.require_credential = false;
        let request = build_request("Hello", "gemma", &config).unwrap();
        assert!(request.bearer.is_none());
    }

    #[test]
    fn test_probes_text_fields() {
        assert_eq!(parse_response(&json!({"response": "Hello!"})).unwrap(), "Hello!");
        assert_eq!(parse_response(&json!({"text": "  a  "})).unwrap(), "a");
        assert_eq!(parse_response(&json!({"output": ["first", "second"]})).unwrap(), "first");
        // An empty list is skipped in favour of the next key.
        assert_eq!(
            parse_response(&json!({"result": [], "output": "fallback"})).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_choices_fallback() {
        assert_eq!(parse_response(&json!({"choices": [{"text": "t"}]})).unwrap(), "t");
        assert_eq!(
            parse_response(&json!({"choices": [{"message": {"content": "m"}}]})).unwrap(),
            "m"
        );
    }

    #[test]
    fn test_unknown_shape_returns_raw_json() {
        let body = json!({"done": true, "model": "gemma"});
        assert_eq!(parse_response(&body).unwrap(), body.to_string());
        assert_eq!(parse_response(&json!(["x"])).unwrap(), r#"["x"]"#);
    }
}
