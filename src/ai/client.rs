use anyhow::Result;
use arc_swap::ArcSwap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;

use super::{AiError, ProviderConfig, ProviderRequest, Responder};

/// Facade over the active provider.
///
/// Holds the current [`ProviderConfig`] as an atomically swappable snapshot.
/// Every call loads the snapshot once up front, so the setters below never
/// race with a request that is already on the wire.
pub struct AiClient {
    http: Client,
    config: ArcSwap<ProviderConfig>,
}

impl AiClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("chatbox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        tracing::info!("AI client ready (provider: {}, model: {})", config.kind, config.model);

        Ok(Self {
            http,
            config: ArcSwap::from_pointee(config),
        })
    }

    pub fn config(&self) -> Arc<ProviderConfig> {
        self.config.load_full()
    }

    pub fn set_provider(&self, config: ProviderConfig) {
        tracing::info!("Switching AI provider to {}", config.kind);
        self.config.store(Arc::new(config));
    }

    pub fn set_api_key(&self, key: &str) {
        self.config
            .rcu(|current| ProviderConfig::clone(current).with_credential(key));
    }

    pub fn set_endpoint(&self, url: &str) {
        self.config
            .rcu(|current| ProviderConfig::clone(current).with_endpoint(url));
    }

    pub fn set_model(&self, model: &str) {
        self.config
            .rcu(|current| ProviderConfig::clone(current).with_model(model));
    }

    /// Send `prompt` to the active provider.
    ///
    /// A blank prompt returns empty text without touching the network. There is
    /// no retry and no fallback to another provider.
    pub async fn get_response(&self, prompt: &str, model: Option<&str>) -> Result<String, AiError> {
        if prompt.trim().is_empty() {
            return Ok(String::new());
        }

        let config = self.config.load_full();
        let adapter = config.kind.adapter();
        let model = model.unwrap_or(&config.model);

        let request = adapter.build_request(prompt, model, &config)?;

        let started = Instant::now();
        let raw = self.send(&request).await;
        tracing::debug!(
            "{} request finished in {:?} ({})",
            config.kind,
            started.elapsed(),
            if raw.is_ok() { "ok" } else { "failed" }
        );

        let raw = raw?;
        adapter.parse_body(&raw)
    }

    async fn send(&self, request: &ProviderRequest) -> Result<String, AiError> {
        tracing::debug!("POST {}", request.url);

        let mut builder = self
            .http
            .post(&request.url)
            .header("Content-Type", "application/json")
            .timeout(request.timeout)
            .json(&request.body);

        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token.expose());
        }

        if !request.query.is_empty() {
            let query: Vec<(&str, &str)> = request
                .query
                .iter()
                .map(|(name, value)| (*name, value.expose()))
                .collect();
            builder = builder.query(&query);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!("Provider returned HTTP {}", status.as_u16());
            return Err(AiError::protocol(status.as_u16(), &body));
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl Responder for AiClient {
    async fn get_response(&self, prompt: &str, model: Option<&str>) -> Result<String, AiError> {
        AiClient::get_response(self, prompt, model).await
    }
}
