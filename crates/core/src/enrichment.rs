use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::target::LookupTarget;

/// Company record exactly as returned by the enrichment API.
#[derive(Clone, Debug, PartialEq)]
pub struct CompanyProfile(Value);

impl CompanyProfile {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn display_name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str).map(str::trim).filter(|name| !name.is_empty())
    }

    /// Pretty-prints the payload with its original key order and number text.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("enrichment API rejected the configured credentials")]
    Unauthorized,
    #[error("enrichment API rate limit reached")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("enrichment API has no company for this URL")]
    NotFound,
    #[error("enrichment API returned HTTP {status}: {snippet}")]
    Api { status: u16, snippet: String },
    #[error("enrichment API returned an empty response")]
    EmptyResponse,
    #[error("enrichment API returned invalid JSON: {0}")]
    Decode(String),
    #[error("enrichment API request timed out")]
    Timeout,
    #[error("enrichment API request failed: {0}")]
    Transport(String),
}

impl EnrichmentError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound => "not_found",
            Self::Api { .. } => "api_error",
            Self::EmptyResponse => "empty_response",
            Self::Decode(_) => "decode",
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
        }
    }

    /// Text shown in the chat thread when a lookup fails.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => {
                "The enrichment service rejected our API key. Ask an admin to check the configuration."
                    .to_owned()
            }
            Self::RateLimited { retry_after_secs: Some(secs) } => {
                format!("The enrichment service is rate limiting us. Try again in {secs}s.")
            }
            Self::RateLimited { retry_after_secs: None } => {
                "The enrichment service is rate limiting us. Try again shortly.".to_owned()
            }
            Self::NotFound | Self::EmptyResponse => {
                "No company data was found for that URL.".to_owned()
            }
            Self::Api { status, snippet } if snippet.is_empty() => {
                format!("The enrichment service returned an error (HTTP {status}).")
            }
            Self::Api { status, snippet } => {
                format!("The enrichment service returned an error (HTTP {status}): {snippet}")
            }
            Self::Decode(_) => "The enrichment service sent a response we could not read.".to_owned(),
            Self::Timeout | Self::Transport(_) => {
                "Could not reach the enrichment service. Please try again.".to_owned()
            }
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, target: &LookupTarget) -> Result<CompanyProfile, EnrichmentError>;
}
