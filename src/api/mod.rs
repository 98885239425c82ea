//! Provider API access
//!
//! Requests either go straight to the provider with an API key, or through a
//! relay that holds the key and authenticates callers with a signed token.

pub mod chat;
pub mod files;
pub mod token;

use serde::Deserialize;
use thiserror::Error;

use crate::types::config::ClientConfig;

/// Provider API version segment
pub const API_VERSION: &str = "v1beta";

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Missing required parameters")]
    MissingCredentials,
    #[error("Unable to get upload URL")]
    NoUploadUrl,
    #[error("Request parameter error: {0}")]
    InvalidRequest(String),
}

/// Where requests are sent and how they authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Talk to the provider with an API key
    Direct {
        api_key: String,
        base_url: String,
        upload_url: String,
    },
    /// Talk to a relay exposing `/api/*` routes
    Relay { relay_url: String, password: String },
}

impl Endpoint {
    /// Pick direct mode when an API key is set, otherwise the relay
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        if !config.api_key.is_empty() {
            return Ok(Endpoint::Direct {
                api_key: config.api_key.clone(),
                base_url: config.base_url.trim_end_matches('/').to_string(),
                upload_url: config.upload_url.trim_end_matches('/').to_string(),
            });
        }
        match &config.relay_url {
            Some(relay_url) => Ok(Endpoint::Relay {
                relay_url: relay_url.trim_end_matches('/').to_string(),
                password: config.password.clone(),
            }),
            None => Err(ApiError::MissingCredentials),
        }
    }

    /// Fresh relay token; `None` in direct mode
    pub fn token(&self) -> Option<String> {
        match self {
            Endpoint::Relay { password, .. } => Some(token::encode_token(password)),
            Endpoint::Direct { .. } => None,
        }
    }
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderErrorDetail>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// Turn a failed response body into an error, keeping the provider's message
pub(crate) fn provider_error(status: reqwest::StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.error.map(|e| e.message).or(b.message))
        .unwrap_or_else(|| body.trim().to_string());
    ApiError::Provider {
        status: status.as_u16(),
        message,
    }
}

/// Return the body of a successful response, or the provider error
pub(crate) async fn read_success(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(provider_error(status, &body));
    }
    Ok(body)
}
