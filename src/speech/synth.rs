//! Speech synthesis

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::speech::SpeechError;
use crate::types::config::ClientConfig;

/// Turns text into encoded audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

/// Client for OpenAI-compatible `/v1/audio/speech` endpoints
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    response_format: String,
}

impl HttpSynthesizer {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            api_key,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            response_format: "mp3".to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.tts_api_url.clone(), config.tts_api_key.clone())
            .with_voice(config.tts_voice.clone())
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Audio encoding requested from the endpoint, e.g. `mp3` or `wav`
    pub fn with_format(mut self, response_format: impl Into<String>) -> Self {
        self.response_format = response_format.into();
        self
    }

    pub fn response_format(&self) -> &str {
        &self.response_format
    }

    fn body(&self, text: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": self.response_format,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let mut request = self.client.post(&self.url).json(&self.body(text));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SpeechError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        let audio = response.bytes().await?;
        tracing::debug!("Synthesized {} bytes for {} chars", audio.len(), text.chars().count());
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let synth = HttpSynthesizer::new("http://localhost:8080/v1/audio/speech", None)
            .with_voice("nova")
            .with_format("wav");
        let body = synth.body("Hello.");
        assert_eq!(body["model"], "tts-1");
        assert_eq!(body["input"], "Hello.");
        assert_eq!(body["voice"], "nova");
        assert_eq!(body["response_format"], "wav");
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig {
            tts_voice: "shimmer".to_string(),
            tts_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let synth = HttpSynthesizer::from_config(&config);
        assert_eq!(synth.voice, "shimmer");
        assert_eq!(synth.api_key.as_deref(), Some("sk-test"));
        assert_eq!(synth.response_format(), "mp3");
    }
}
