use reqwest::Client;
use serde::Deserialize;

use super::{AiError, ProviderConfig};

const MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const LIST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Listing URL derived from the configured generate endpoint, so a custom
/// host is listed from the same place it is called.
fn models_url(config: &ProviderConfig) -> String {
    config
        .endpoint
        .as_deref()
        .and_then(|endpoint| endpoint.find("/models/").map(|idx| &endpoint[..idx + "/models".len()]))
        .unwrap_or(MODELS_URL)
        .to_string()
}

/// Models available to the configured candidate-content credential.
pub async fn list_models(config: &ProviderConfig) -> Result<Vec<ModelInfo>, AiError> {
    let key = config
        .credential
        .as_ref()
        .ok_or_else(|| AiError::Configuration(format!("no API key configured for {}", config.kind)))?;

    let response = Client::new()
        .get(models_url(config))
        .query(&[("key", key.expose())])
        .timeout(std::time::Duration::from_secs(LIST_TIMEOUT_SECS))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AiError::protocol(status.as_u16(), &body));
    }

    let list: ModelList = serde_json::from_str(&body).map_err(|_| AiError::format(body.clone()))?;
    tracing::debug!("Provider listed {} models", list.models.len());
    Ok(list.models)
}
