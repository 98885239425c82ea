//! Settings storage
//!
//! Manages persistence of user preferences in the key-value store.

use serde::{Deserialize, Serialize};

use crate::storage::kv::JsonStore;
use crate::storage::StorageError;
use crate::types::model::DEFAULT_MODEL;

const SETTINGS_KEY: &str = "settings";

/// How a reply is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TalkMode {
    /// Text only
    #[default]
    Chat,
    /// Text plus spoken sentences
    Voice,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Access password for relay deployments
    #[serde(default)]
    pub password: String,
    /// Provider API key; empty means requests go through the relay
    #[serde(default)]
    pub api_key: String,
    /// Base URL override for direct API calls
    #[serde(default = "default_api_proxy")]
    pub api_proxy: String,
    /// Base URL override for upload calls (falls back to `api_proxy`)
    #[serde(default)]
    pub upload_proxy: String,
    /// Relay origin exposing `/api/*` routes
    #[serde(default)]
    pub relay_url: String,
    /// Locale used for sentence segmentation
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Speech synthesis locale
    #[serde(default)]
    pub tts_lang: String,
    /// Speech synthesis voice
    #[serde(default)]
    pub tts_voice: String,
    #[serde(default)]
    pub talk_mode: TalkMode,
    #[serde(default = "default_model")]
    pub model: String,
    /// Temperature parameter for text generation (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Top-k sampling parameter
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Maximum number of tokens to generate
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Most recent messages sent with each request (0 = send all)
    #[serde(default)]
    pub max_history_length: u32,
    #[serde(default)]
    pub system_instruction: String,
}

fn default_api_proxy() -> String {
    crate::types::config::DEFAULT_API_BASE_URL.to_string()
}

fn default_lang() -> String {
    "en-US".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    0.95
}

fn default_top_k() -> u32 {
    64
}

fn default_max_output_tokens() -> u32 {
    8192
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            password: String::new(),
            api_key: String::new(),
            api_proxy: default_api_proxy(),
            upload_proxy: String::new(),
            relay_url: String::new(),
            lang: default_lang(),
            tts_lang: String::new(),
            tts_voice: String::new(),
            talk_mode: TalkMode::Chat,
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
            max_history_length: 0,
            system_instruction: String::new(),
        }
    }
}

impl Settings {
    /// Validate settings values
    ///
    /// Clamps sampling parameters into the ranges the API accepts.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = default_top_k();
        }

        self.max_output_tokens = self.max_output_tokens.clamp(1, 65536);

        if self.model.trim().is_empty() {
            self.model = default_model();
        }

        if self.lang.trim().is_empty() {
            self.lang = default_lang();
        }

        if self.api_proxy.trim().is_empty() {
            self.api_proxy = default_api_proxy();
        }
        self.api_proxy = self.api_proxy.trim_end_matches('/').to_string();
        self.upload_proxy = self.upload_proxy.trim_end_matches('/').to_string();
        self.relay_url = self.relay_url.trim_end_matches('/').to_string();
    }
}

/// Load settings from the store
///
/// Returns default settings if none are stored or the entry is corrupted
pub fn load_settings(store: &JsonStore) -> Settings {
    match store.get::<Settings>(SETTINGS_KEY) {
        Some(mut settings) => {
            settings.validate();
            tracing::debug!("Loaded settings from store");
            settings
        }
        None => {
            tracing::info!("No stored settings, using defaults");
            Settings::default()
        }
    }
}

/// Save settings to the store
pub fn save_settings(store: &JsonStore, settings: &Settings) -> Result<(), StorageError> {
    store.set(SETTINGS_KEY, settings)?;
    tracing::debug!("Saved settings to store");
    Ok(())
}
