//! Streaming chat client
//!
//! Sends a conversation to the provider and exposes the reply as a stream of
//! UTF-8 text bytes, whichever transport produced it. Direct calls use the
//! provider's server-sent-events mode; the relay already streams plain text.

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::api::{provider_error, read_success, ApiError, Endpoint, API_VERSION};
use crate::storage::settings::Settings;
use crate::types::message::{Message, Part, Role};
use crate::types::model::{filter_models, ModelInfo};

/// Stream of reply text as raw UTF-8 bytes
pub type TextByteStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// Sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

/// A chat turn to send
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub system_instruction: Option<String>,
    pub generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: Role,
    parts: &'a [Part],
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayChatBody<'a> {
    messages: Vec<Content<'a>>,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a str>,
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    code: u16,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Incremental parser for `data:` lines of a server-sent-events body
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the payloads of every completed `data:` line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            payloads.extend(data_payload(&line));
        }
        payloads
    }

    /// End of body: a last `data:` line may lack its newline
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\n', '\r']);
    line.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
}

/// Turn a server-sent-events body into reply text bytes
fn sse_text_stream<S, B, E>(bytes: S) -> TextByteStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let mut decoder = SseDecoder::new();
    bytes
        .map(Some)
        .chain(stream::iter([None]))
        .map(move |chunk| {
            let payloads = match chunk {
                Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                Some(Err(e)) => return vec![Err(e.into())],
                None => decoder.finish(),
            };
            payloads
                .into_iter()
                .map(|payload| event_text(&payload).map(String::into_bytes))
                .filter(|text| !matches!(text, Ok(t) if t.is_empty()))
                .collect::<Vec<_>>()
        })
        .flat_map(stream::iter)
        .boxed()
}

/// Extract the reply text from one streamed JSON event
fn event_text(payload: &str) -> Result<String, ApiError> {
    let event: StreamResponse = serde_json::from_str(payload)?;
    if let Some(error) = event.error {
        return Err(ApiError::Provider {
            status: error.code,
            message: error.message,
        });
    }
    Ok(event
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect())
}

/// Chat client for the configured endpoint
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: Endpoint,
}

impl ChatClient {
    pub fn new(endpoint: Endpoint) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("gemini-talk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let url = match &self.endpoint {
            Endpoint::Direct { base_url, .. } => format!("{}/{}/{}", base_url, API_VERSION, path),
            Endpoint::Relay { relay_url, .. } => format!("{}/api/{}", relay_url, path),
        };
        let mut url = Url::parse(&url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid URL '{}': {}", url, e)))?;
        if let Some(token) = self.endpoint.token() {
            url.query_pairs_mut().append_pair("token", &token);
        }
        Ok(url)
    }

    /// Start a streamed reply
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<TextByteStream, ApiError> {
        if request.messages.is_empty() {
            return Err(ApiError::InvalidRequest("no messages to send".to_string()));
        }
        let contents: Vec<Content<'_>> = request
            .messages
            .iter()
            .map(|m| Content {
                role: m.role,
                parts: &m.parts,
            })
            .collect();

        let response = match &self.endpoint {
            Endpoint::Direct { api_key, .. } => {
                let mut url = self.url(&format!("models/{}:streamGenerateContent", request.model))?;
                url.query_pairs_mut().append_pair("alt", "sse");
                let body = GenerateContentBody {
                    contents,
                    system_instruction: request.system_instruction.as_ref().map(|text| {
                        SystemInstruction {
                            parts: vec![Part::text(text.clone())],
                        }
                    }),
                    generation_config: &request.generation_config,
                };
                self.client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&body)
                    .send()
                    .await?
            }
            Endpoint::Relay { .. } => {
                let body = RelayChatBody {
                    messages: contents,
                    model: &request.model,
                    system_instruction: request.system_instruction.as_deref(),
                    generation_config: &request.generation_config,
                };
                self.client.post(self.url("chat")?).json(&body).send().await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(status, &body));
        }
        tracing::debug!("Streaming reply from {}", request.model);

        let bytes = response.bytes_stream();
        match &self.endpoint {
            Endpoint::Relay { .. } => Ok(bytes
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ApiError::from))
                .boxed()),
            Endpoint::Direct { .. } => Ok(sse_text_stream(bytes)),
        }
    }

    /// List Gemini models available to this endpoint
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        let mut request = self.client.get(self.url("models")?);
        if let Endpoint::Direct { api_key, .. } = &self.endpoint {
            request = request.header("x-goog-api-key", api_key);
        }
        let body = read_success(request.send().await?).await?;
        let list: ModelList = serde_json::from_str(&body)?;
        Ok(filter_models(list.models))
    }
}
