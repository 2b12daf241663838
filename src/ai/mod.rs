pub mod client;
pub mod error;
pub mod gemini;
pub mod generate;
pub mod models;
pub mod openai;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use client::AiClient;
pub use error::AiError;

/// Anything that can turn a prompt into reply text. The worker only sees this.
#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    async fn get_response(&self, prompt: &str, model: Option<&str>) -> Result<String, AiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Chat-completion API (`choices[0].message.content`).
    OpenAI,
    /// Generate-style local or custom endpoint.
    Gemma,
    /// Candidate-content API (`candidates[0].content.parts[0].text`).
    Gemini,
}

impl ProviderKind {
    pub fn adapter(self) -> Adapter {
        match self {
            ProviderKind::OpenAI => Adapter::ChatCompletion,
            ProviderKind::Gemma => Adapter::Generate,
            ProviderKind::Gemini => Adapter::Candidate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemma => "gemma",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "chat" => Ok(ProviderKind::OpenAI),
            "gemma" | "generate" | "local" | "ollama" => Ok(ProviderKind::Gemma),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(format!("unknown AI provider: {other}")),
        }
    }
}

/// Credential string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Immutable settings for one provider. A change of credential, endpoint or
/// model builds a new value; calls already running keep the one they started with.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    pub credential: Option<Secret>,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f64,
    pub require_credential: bool,
    /// Generate-style only: send `{prompt}` instead of the full body.
    pub compact_body: bool,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        let (endpoint, model, timeout_secs) = match kind {
            ProviderKind::OpenAI => (openai::DEFAULT_ENDPOINT, openai::DEFAULT_MODEL, openai::TIMEOUT_SECS),
            ProviderKind::Gemma => (generate::DEFAULT_ENDPOINT, generate::DEFAULT_MODEL, generate::TIMEOUT_SECS),
            ProviderKind::Gemini => (gemini::DEFAULT_ENDPOINT, gemini::DEFAULT_MODEL, gemini::TIMEOUT_SECS),
        };

        Self {
            kind,
            endpoint: Some(endpoint.to_string()),
            credential: None,
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            max_tokens: 512,
            temperature: 0.7,
            require_credential: true,
            compact_body: false,
        }
    }

    pub fn with_credential(mut self, key: impl Into<String>) -> Self {
        self.credential = non_blank(key.into()).map(Secret::new);
        self
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = non_blank(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn require_endpoint(&self) -> Result<&str, AiError> {
        self.endpoint.as_deref().ok_or_else(|| {
            AiError::Configuration(format!("no endpoint configured for {}", self.kind))
        })
    }

    /// `Ok(None)` only when the provider is allowed to run without a key.
    pub(crate) fn credential_for_call(&self) -> Result<Option<&str>, AiError> {
        match (&self.credential, self.require_credential) {
            (Some(secret), _) => Ok(Some(secret.expose())),
            (None, false) => Ok(None),
            (None, true) => Err(AiError::Configuration(format!(
                "no API key configured for {}",
                self.kind
            ))),
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A fully built provider call, ready for the transport.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub bearer: Option<Secret>,
    pub query: Vec<(&'static str, Secret)>,
    pub body: Value,
    pub timeout: Duration,
}

/// Wire-format strategy, one variant per provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    ChatCompletion,
    Generate,
    Candidate,
}

impl Adapter {
    pub fn build_request(
        &self,
        prompt: &str,
        model: &str,
        config: &ProviderConfig,
    ) -> Result<ProviderRequest, AiError> {
        match self {
            Adapter::ChatCompletion => openai::build_request(prompt, model, config),
            Adapter::Generate => generate::build_request(prompt, model, config),
            Adapter::Candidate => gemini::build_request(prompt, model, config),
        }
    }

    pub fn parse_response(&self, body: &Value) -> Result<String, AiError> {
        match self {
            Adapter::ChatCompletion => openai::parse_response(body),
            Adapter::Generate => generate::parse_response(body),
            Adapter::Candidate => gemini::parse_response(body),
        }
    }

    /// Parse a raw success body. Anything that is not JSON is a format failure.
    pub fn parse_body(&self, raw: &str) -> Result<String, AiError> {
        let body: Value = serde_json::from_str(raw).map_err(|_| AiError::format(raw))?;
        self.parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Gemma);
        assert_eq!(" gemini ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_secret_debug_is_masked() {
        let config = ProviderConfig::new(ProviderKind::OpenAI).with_credential("sk-live-123");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk-live-123"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_blank_values_count_as_absent() {
        let config = ProviderConfig::new(ProviderKind::Gemma)
            .with_credential("   ")
            .with_endpoint("");
        assert!(config.credential.is_none());
        assert!(config.endpoint.is_none());
        assert!(matches!(config.require_endpoint(), Err(AiError::Configuration(_))));
        assert!(matches!(config.credential_for_call(), Err(AiError::Configuration(_))));
    }

    #[test]
    fn test_optional_credential() {
        let mut config = ProviderConfig::new(ProviderKind::Gemma);
        config.require_credential = false;
        assert_eq!(config.credential_for_call().unwrap(), None);
    }

    #[test]
    fn test_non_json_body_is_format_error() {
        let err = Adapter::ChatCompletion.parse_body("<html>oops</html>").unwrap_err();
        assert_eq!(err, AiError::format("<html>oops</html>"));
    }
}
