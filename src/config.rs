use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::ai::{ProviderConfig, ProviderKind};
use crate::stream::RenderSettings;
use crate::worker::WorkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    pub log_level: LogLevel,
    pub openai: ProviderSettings,
    pub gemma: ProviderSettings,
    pub gemini: ProviderSettings,
    pub stream: StreamSettings,
    pub worker: WorkerSettings,
}

/// Per-provider overrides. Anything left unset falls back to the provider's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub endpoint: Option<String>,
    /// Only ever read from the environment; never written to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub require_credential: Option<bool>,
    pub compact_body: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub chunk_size: usize,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub max_concurrency: usize,
    pub supersede: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemma,
            log_level: LogLevel::Info,
            openai: ProviderSettings::defaults_for(ProviderKind::OpenAI),
            gemma: ProviderSettings::defaults_for(ProviderKind::Gemma),
            gemini: ProviderSettings::defaults_for(ProviderKind::Gemini),
            stream: StreamSettings::default(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        let defaults = RenderSettings::default();
        Self {
            chunk_size: defaults.chunk_size,
            interval_ms: defaults.interval.as_millis() as u64,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let defaults = WorkerConfig::default();
        Self {
            max_concurrency: defaults.max_concurrency,
            supersede: defaults.supersede,
        }
    }
}

impl ProviderSettings {
    fn defaults_for(kind: ProviderKind) -> Self {
        let base = ProviderConfig::new(kind);
        Self {
            endpoint: base.endpoint,
            api_key: None,
            model: Some(base.model),
            timeout_secs: Some(base.timeout.as_secs()),
            max_tokens: Some(base.max_tokens),
            temperature: Some(base.temperature),
            require_credential: Some(base.require_credential),
            compact_body: (kind == ProviderKind::Gemma).then_some(base.compact_body),
        }
    }

    fn to_provider_config(&self, kind: ProviderKind) -> ProviderConfig {
        let mut config = ProviderConfig::new(kind);

        if let Some(ref endpoint) = self.endpoint {
            config = config.with_endpoint(endpoint.as_str());
        }
        if let Some(ref key) = self.api_key {
            config = config.with_credential(key.as_str());
        }
        if let Some(ref model) = self.model {
            config = config.with_model(model.as_str());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(required) = self.require_credential {
            config.require_credential = required;
        }
        if let Some(compact) = self.compact_body {
            config.compact_body = compact;
        }

        config
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = Self::load_from(&config_path).await?;

        if !config_path.exists() {
            config.save_to(&config_path).await?;
        }

        // Environment (including .env) always wins over the file
        config.load_from_env();

        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content).await?;

        tracing::info!("Config saved to: {}", path.display());
        Ok(())
    }

    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;

        Ok(home.join(".chatbox"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("chatbox.log"))
    }

    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which is `std::env::var` outside of tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("AI_PROVIDER") {
            match provider.parse() {
                Ok(kind) => self.provider = kind,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        let sections = [
            (ProviderKind::OpenAI, "OPENAI_API_KEY", "OPENAI_API_URL", "OPENAI_MODEL"),
            (ProviderKind::Gemma, "GEMMA_API_KEY", "GEMMA_URL", "GEMMA_MODEL"),
            (ProviderKind::Gemini, "GEMINI_API_KEY", "GEMINI_URL", "GEMINI_MODEL"),
        ];

        for (kind, key_var, url_var, model_var) in sections {
            let settings = self.settings_mut(kind);

            if let Some(key) = lookup(key_var).filter(|k| !k.trim().is_empty()) {
                settings.api_key = Some(key);
                tracing::info!("Loaded {} API key from environment", kind);
            }
            if let Some(url) = lookup(url_var) {
                settings.endpoint = Some(url);
            }
            if let Some(model) = lookup(model_var) {
                settings.model = Some(model);
            }
        }

        if let Some(size) = lookup("CHATBOX_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.stream.chunk_size = size;
        }

        if let Some(ms) = lookup("CHATBOX_CHUNK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.stream.interval_ms = ms;
        }

        if let Some(n) = lookup("CHATBOX_MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.worker.max_concurrency = n;
        }

        if let Some(level) = lookup("CHATBOX_LOG_LEVEL") {
            match level.to_lowercase().as_str() {
                "error" => self.log_level = LogLevel::Error,
                "warn" => self.log_level = LogLevel::Warn,
                "info" => self.log_level = LogLevel::Info,
                "debug" => self.log_level = LogLevel::Debug,
                "trace" => self.log_level = LogLevel::Trace,
                _ => tracing::warn!("Unknown log level: {}", level),
            }
        }
    }

    fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAI => &self.openai,
            ProviderKind::Gemma => &self.gemma,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    fn settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::OpenAI => &mut self.openai,
            ProviderKind::Gemma => &mut self.gemma,
            ProviderKind::Gemini => &mut self.gemini,
        }
    }

    pub fn provider_config(&self, kind: ProviderKind) -> ProviderConfig {
        self.settings(kind).to_provider_config(kind)
    }

    pub fn active_provider(&self) -> ProviderConfig {
        self.provider_config(self.provider)
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            chunk_size: self.stream.chunk_size,
            interval: Duration::from_millis(self.stream.interval_ms),
        }
    }

    pub fn worker_config(&self, model: Option<String>) -> WorkerConfig {
        WorkerConfig {
            max_concurrency: self.worker.max_concurrency,
            supersede: self.worker.supersede,
            model,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.chunk_size == 0 {
            return Err(anyhow::anyhow!("Stream chunk size must be greater than 0"));
        }

        if self.worker.max_concurrency == 0 {
            return Err(anyhow::anyhow!("Worker max concurrency must be greater than 0"));
        }

        for kind in [ProviderKind::OpenAI, ProviderKind::Gemma, ProviderKind::Gemini] {
            let provider = self.provider_config(kind);

            if provider.timeout.is_zero() {
                return Err(anyhow::anyhow!("Timeout for {} must be greater than 0", kind));
            }

            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(anyhow::anyhow!(
                    "Temperature for {} must be between 0.0 and 2.0",
                    kind
                ));
            }
        }

        // Missing keys only warn: the client refuses the call itself.
        let active = self.active_provider();
        if active.credential.is_none() && active.require_credential {
            tracing::warn!(
                "No API key set for {}. Requests will fail until one is configured.",
                active.kind
            );
        }
        if active.endpoint.is_none() {
            tracing::warn!("No endpoint set for {}", active.kind);
        }

        Ok(())
    }

    pub fn get_tracing_level(&self) -> tracing::Level {
        match self.log_level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider, ProviderKind::Gemma);
        assert!(config.validate().is_ok());

        let openai = config.provider_config(ProviderKind::OpenAI);
        assert_eq!(openai.timeout, Duration::from_secs(15));
        assert_eq!(openai.model, "gpt-3.5-turbo");

        let gemma = config.active_provider();
        assert_eq!(gemma.endpoint.as_deref(), Some("http://localhost:11434/api/generate"));
        assert_eq!(gemma.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("AI_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("GEMMA_URL", "http://gpu-box:11434/api/generate"),
            ("GEMINI_API_KEY", "   "),
            ("CHATBOX_CHUNK_SIZE", "12"),
            ("CHATBOX_CHUNK_INTERVAL_MS", "40"),
            ("CHATBOX_LOG_LEVEL", "DEBUG"),
        ]));

        assert_eq!(config.provider, ProviderKind::OpenAI);
        let active = config.active_provider();
        assert_eq!(active.credential.as_ref().map(|s| s.expose()), Some("sk-env"));
        assert_eq!(active.model, "gpt-4o-mini");
        assert_eq!(
            config.provider_config(ProviderKind::Gemma).endpoint.as_deref(),
            Some("http://gpu-box:11434/api/generate")
        );
        assert!(config.provider_config(ProviderKind::Gemini).credential.is_none());
        assert_eq!(config.render_settings().chunk_size, 12);
        assert_eq!(config.render_settings().interval, Duration::from_millis(40));
        assert_eq!(config.get_tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_unknown_provider_keeps_current() {
        let mut config = Config::default();
        config.apply_env(env(&[("AI_PROVIDER", "claude")]));
        assert_eq!(config.provider, ProviderKind::Gemma);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.stream.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.worker.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gemini.timeout_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.openai.temperature = Some(3.5);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_never_writes_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.apply_env(env(&[("GEMMA_API_KEY", "super-secret"), ("GEMMA_MODEL", "gemma2")]));
        config.save_to(&path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("super-secret"));
        assert!(written.contains("temperature = 0.7\n"));

        let reloaded = Config::load_from(&path).await.unwrap();
        assert_eq!(reloaded.gemma.model.as_deref(), Some("gemma2"));
        assert!(reloaded.gemma.api_key.is_none());
    }

    #[tokio::test]
    async fn test_partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "provider = \"gemini\"\n\n[gemini]\nmodel = \"gemini-pro\"\n\n[stream]\nchunk_size = 20\n",
        )
        .unwrap();

        let config = Config::load_from(&path).await.unwrap();
        let gemini = config.active_provider();
        assert_eq!(gemini.kind, ProviderKind::Gemini);
        assert_eq!(gemini.model, "gemini-pro");
        assert_eq!(gemini.timeout, Duration::from_secs(20));
        assert_eq!(config.stream.chunk_size, 20);
        assert_eq!(config.stream.interval_ms, 28);
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.provider, ProviderKind::Gemma);
    }
}
