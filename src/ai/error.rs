use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Longest body excerpt carried by a protocol failure.
pub const EXCERPT_LIMIT: usize = 300;

/// Every way a single provider call can fail.
///
/// Adapters convert all I/O and parsing problems into one of these, so nothing
/// past the client boundary ever sees a raw `reqwest` or `serde_json` error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AiError {
    /// Credential or endpoint missing for the active provider. No request was sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {detail}")]
    Network { detail: String, timed_out: bool },

    /// Non-success HTTP status.
    #[error("provider returned HTTP {status}: {excerpt}")]
    Protocol { status: u16, excerpt: String },

    /// Body lacked every recognized success shape; `raw` is the serialized body.
    #[error("unrecognized response format: {raw}")]
    Format { raw: String },

    /// Superseded by a newer request or stopped at shutdown.
    #[error("request cancelled")]
    Cancelled,
}

impl AiError {
    pub fn protocol(status: u16, body: &str) -> Self {
        AiError::Protocol {
            status,
            excerpt: truncate(body.trim(), EXCERPT_LIMIT),
        }
    }

    pub fn format(raw: impl Into<String>) -> Self {
        AiError::Format { raw: raw.into() }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AiError::Network { timed_out: true, .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AiError::Configuration(_) => "configuration",
            AiError::Network { .. } => "network",
            AiError::Protocol { .. } => "protocol",
            AiError::Format { .. } => "format",
            AiError::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return AiError::Protocol {
                status: status.as_u16(),
                excerpt: String::new(),
            };
        }

        AiError::Network {
            timed_out: err.is_timeout(),
            detail: redact_credentials(&err.to_string()),
        }
    }
}

/// Cut `text` to at most `limit` chars, never splitting a char.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Mask `key=<value>` query parameters. reqwest errors echo the request URL,
/// and the candidate-content provider carries its credential there.
pub fn redact_credentials(text: &str) -> String {
    static KEY_PARAM: OnceLock<Regex> = OnceLock::new();
    let re = KEY_PARAM.get_or_init(|| {
        Regex::new(r"([?&]key=)[^&\s)]+").expect("static regex is valid")
    });
    re.replace_all(text, "${1}***").into_owned()
}
