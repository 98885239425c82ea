//! Configuration types
//!
//! Runtime client configuration, assembled from persisted settings and the
//! process environment.

use serde::{Deserialize, Serialize};

use crate::storage::settings::Settings;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TTS_API_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Provider API key; empty means relay mode
    pub api_key: String,
    /// Base URL for chat, model and file metadata calls
    pub base_url: String,
    /// Base URL for the upload endpoints
    pub upload_url: String,
    /// Relay origin used when no API key is configured
    pub relay_url: Option<String>,
    /// Access password shared with the relay
    pub password: String,
    /// Reject uploads above this many bytes (0 = unlimited)
    pub upload_limit: u64,
    /// Speech synthesis endpoint
    pub tts_api_url: String,
    pub tts_api_key: Option<String>,
    pub tts_voice: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_url: DEFAULT_API_BASE_URL.to_string(),
            relay_url: None,
            password: String::new(),
            upload_limit: 0,
            tts_api_url: DEFAULT_TTS_API_URL.to_string(),
            tts_api_key: None,
            tts_voice: "alloy".to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl ClientConfig {
    /// Configuration derived from persisted settings
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let base_url = non_empty(&settings.api_proxy).unwrap_or(defaults.base_url);
        Self {
            api_key: settings.api_key.trim().to_string(),
            upload_url: non_empty(&settings.upload_proxy).unwrap_or_else(|| base_url.clone()),
            base_url,
            relay_url: non_empty(&settings.relay_url),
            password: settings.password.clone(),
            tts_voice: non_empty(&settings.tts_voice).unwrap_or(defaults.tts_voice),
            ..defaults
        }
    }

    /// Overlay values from the process environment
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable source
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).and_then(|v| non_empty(&v));

        if let Some(key) = var("GEMINI_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = var("GEMINI_API_BASE_URL") {
            self.base_url = url;
        }
        if let Some(url) = var("GEMINI_UPLOAD_BASE_URL") {
            self.upload_url = url;
        }
        if let Some(url) = var("GEMINI_TALK_RELAY_URL") {
            self.relay_url = Some(url);
        }
        if let Some(password) = var("ACCESS_PASSWORD") {
            self.password = password;
        }
        if let Some(limit) = var("UPLOAD_LIMIT").and_then(|s| s.parse().ok()) {
            self.upload_limit = limit;
        }
        if let Some(url) = var("TTS_API_URL") {
            self.tts_api_url = url;
        }
        if let Some(key) = var("TTS_API_KEY") {
            self.tts_api_key = Some(key);
        }
        self
    }
}
