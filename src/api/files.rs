//! File service
//!
//! The upload pipeline talks to the provider's file endpoints through the
//! [`FileService`] trait. [`GeminiFiles`] is the HTTP implementation; it
//! speaks both the single-request multipart protocol and the resumable
//! session protocol (start, sequential `upload` ranges, `upload, finalize`,
//! `query`).

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::json;

use crate::api::{provider_error, read_success, ApiError, Endpoint, API_VERSION};
use crate::types::file::{FileEnvelope, FileMetadata};

const HEADER_API_KEY: &str = "x-goog-api-key";
const HEADER_PROTOCOL: &str = "X-Goog-Upload-Protocol";
const HEADER_COMMAND: &str = "X-Goog-Upload-Command";
const HEADER_OFFSET: &str = "X-Goog-Upload-Offset";
const HEADER_CONTENT_LENGTH: &str = "X-Goog-Upload-Header-Content-Length";
const HEADER_CONTENT_TYPE: &str = "X-Goog-Upload-Header-Content-Type";
const HEADER_UPLOAD_URL: &str = "x-goog-upload-url";
const HEADER_SIZE_RECEIVED: &str = "x-goog-upload-size-received";

/// Description of a file about to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub display_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Operations the upload pipeline needs from the remote file service
#[async_trait]
pub trait FileService: Send + Sync {
    /// Upload a small file in one request
    async fn upload_multipart(
        &self,
        request: &UploadRequest,
        data: Vec<u8>,
    ) -> Result<FileMetadata, ApiError>;

    /// Open a resumable session and return its URL
    async fn start_resumable(&self, request: &UploadRequest) -> Result<String, ApiError>;

    /// Write one byte range at `offset`; the finalizing range returns the file
    async fn upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        data: Vec<u8>,
        finalize: bool,
    ) -> Result<Option<FileMetadata>, ApiError>;

    /// Number of bytes the session has durably received
    async fn query_session(&self, session_url: &str) -> Result<u64, ApiError>;

    /// Fetch the current metadata of an uploaded file
    async fn get_metadata(&self, file_id: &str) -> Result<FileMetadata, ApiError>;
}

/// HTTP implementation of [`FileService`]
#[derive(Clone)]
pub struct GeminiFiles {
    client: Client,
    endpoint: Endpoint,
}

impl GeminiFiles {
    pub fn new(endpoint: Endpoint) -> Result<Self, ApiError> {
        let client = Client::builder()
            // Large ranges on slow links take a while.
            .timeout(std::time::Duration::from_secs(600))
            .user_agent(concat!("gemini-talk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn with_client(client: Client, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }

    /// URL accepting multipart uploads and resumable session starts
    pub fn upload_endpoint(&self, resumable: bool) -> Result<Url, ApiError> {
        let url = match &self.endpoint {
            Endpoint::Direct { upload_url, .. } => {
                format!("{}/upload/{}/files", upload_url, API_VERSION)
            }
            Endpoint::Relay { relay_url, .. } if resumable => {
                format!("{}/api/upload/files", relay_url)
            }
            Endpoint::Relay { relay_url, .. } => format!("{}/api/upload", relay_url),
        };
        Ok(self.with_token(parse_url(&url)?))
    }

    /// URL for one request against an open session
    ///
    /// Relay tokens expire after a minute, so each request gets a fresh one
    /// instead of reusing whatever the session URL carried.
    pub fn session_request_url(&self, session_url: &str) -> Result<Url, ApiError> {
        Ok(self.with_token(parse_url(session_url)?))
    }

    fn with_token(&self, mut url: Url) -> Url {
        if let Some(token) = self.endpoint.token() {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "token")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("token", &token);
        }
        url
    }

    /// URL of the metadata lookup for `file_id`
    pub fn metadata_url(&self, file_id: &str) -> Result<Url, ApiError> {
        match &self.endpoint {
            Endpoint::Direct { base_url, .. } => {
                parse_url(&format!("{}/{}/files/{}", base_url, API_VERSION, file_id))
            }
            Endpoint::Relay { relay_url, .. } => {
                let mut url = parse_url(&format!("{}/api/files", relay_url))?;
                url.query_pairs_mut().append_pair("id", file_id);
                Ok(self.with_token(url))
            }
        }
    }

    /// Route a provider session URL through the relay when one is in use
    ///
    /// The relay forwards `/api/upload/files` to the provider with the same
    /// query string, so only the origin and path change. The returned URL
    /// carries no token; see [`GeminiFiles::session_request_url`].
    pub fn session_url(&self, provider_url: &str) -> Result<Url, ApiError> {
        let url = parse_url(provider_url)?;
        match &self.endpoint {
            Endpoint::Direct { .. } => Ok(url),
            Endpoint::Relay { relay_url, .. } => {
                let mut relayed = parse_url(&format!("{}/api/upload/files", relay_url))?;
                relayed.set_query(url.query());
                Ok(relayed)
            }
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.endpoint {
            Endpoint::Direct { api_key, .. } => request.header(HEADER_API_KEY, api_key),
            Endpoint::Relay { .. } => request,
        }
    }
}

fn parse_url(url: &str) -> Result<Url, ApiError> {
    Url::parse(url).map_err(|e| ApiError::InvalidRequest(format!("invalid URL '{}': {}", url, e)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_envelope(body: &str) -> Result<FileMetadata, ApiError> {
    let envelope: FileEnvelope = serde_json::from_str(body)?;
    envelope
        .file
        .ok_or_else(|| ApiError::InvalidRequest("File upload fail".to_string()))
}

#[async_trait]
impl FileService for GeminiFiles {
    async fn upload_multipart(
        &self,
        request: &UploadRequest,
        data: Vec<u8>,
    ) -> Result<FileMetadata, ApiError> {
        let metadata = json!({ "file": { "displayName": request.display_name } });
        let metadata_part = reqwest::multipart::Part::text(metadata.to_string())
            .mime_str("application/json")?;
        let file_part = reqwest::multipart::Part::bytes(data)
            .file_name(request.display_name.clone())
            .mime_str(&request.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let url = self.upload_endpoint(false)?;
        tracing::debug!("Multipart upload of '{}' to {}", request.display_name, url.path());
        let response = self
            .authorize(self.client.post(url))
            .header(HEADER_PROTOCOL, "multipart")
            .multipart(form)
            .send()
            .await?;
        parse_envelope(&read_success(response).await?)
    }

    async fn start_resumable(&self, request: &UploadRequest) -> Result<String, ApiError> {
        let url = self.upload_endpoint(true)?;
        let response = self
            .authorize(self.client.post(url))
            .header(HEADER_PROTOCOL, "resumable")
            .header(HEADER_COMMAND, "start")
            .header(HEADER_CONTENT_LENGTH, request.size.to_string())
            .header(HEADER_CONTENT_TYPE, request.mime_type.as_str())
            .json(&json!({ "file": { "display_name": request.display_name } }))
            .send()
            .await?;

        let status = response.status();
        let session = header_str(response.headers(), HEADER_UPLOAD_URL).map(str::to_string);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(status, &body));
        }
        let session = session.ok_or(ApiError::NoUploadUrl)?;
        Ok(self.session_url(&session)?.to_string())
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        data: Vec<u8>,
        finalize: bool,
    ) -> Result<Option<FileMetadata>, ApiError> {
        let command = if finalize { "upload, finalize" } else { "upload" };
        let response = self
            .authorize(self.client.post(self.session_request_url(session_url)?))
            .header(HEADER_COMMAND, command)
            .header(HEADER_OFFSET, offset.to_string())
            .body(data)
            .send()
            .await?;
        let body = read_success(response).await?;
        if finalize {
            Ok(Some(parse_envelope(&body)?))
        } else {
            Ok(None)
        }
    }

    async fn query_session(&self, session_url: &str) -> Result<u64, ApiError> {
        let response = self
            .authorize(self.client.post(self.session_request_url(session_url)?))
            .header(HEADER_COMMAND, "query")
            .send()
            .await?;
        let status = response.status();
        let received = header_str(response.headers(), HEADER_SIZE_RECEIVED)
            .and_then(|v| v.trim().parse::<u64>().ok());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(status, &body));
        }
        received.ok_or_else(|| {
            ApiError::InvalidRequest("upload session did not report received size".to_string())
        })
    }

    async fn get_metadata(&self, file_id: &str) -> Result<FileMetadata, ApiError> {
        let url = self.metadata_url(file_id)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let body = read_success(response).await?;
        // Direct lookups return the bare record, the relay may wrap it.
        match serde_json::from_str::<FileEnvelope>(&body) {
            Ok(FileEnvelope { file: Some(file) }) => Ok(file),
            _ => Ok(serde_json::from_str(&body)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct() -> GeminiFiles {
        GeminiFiles::with_client(
            Client::new(),
            Endpoint::Direct {
                api_key: "key".to_string(),
                base_url: "https://api.example.com".to_string(),
                upload_url: "https://upload.example.com".to_string(),
            },
        )
    }

    fn relay() -> GeminiFiles {
        GeminiFiles::with_client(
            Client::new(),
            Endpoint::Relay {
                relay_url: "https://chat.example.com".to_string(),
                password: "pw".to_string(),
            },
        )
    }

    #[test]
    fn test_direct_urls() {
        let files = direct();
        assert_eq!(
            files.upload_endpoint(true).unwrap().as_str(),
            "https://upload.example.com/upload/v1beta/files"
        );
        assert_eq!(
            files.metadata_url("abc").unwrap().as_str(),
            "https://api.example.com/v1beta/files/abc"
        );
        let session = "https://upload.example.com/upload/v1beta/files?upload_id=XYZ&upload_protocol=resumable";
        assert_eq!(files.session_url(session).unwrap().as_str(), session);
    }

    #[test]
    fn test_relay_urls_carry_token() {
        let files = relay();
        let url = files.upload_endpoint(false).unwrap();
        assert_eq!(url.path(), "/api/upload");
        assert!(url.query_pairs().any(|(k, _)| k == "token"));

        let url = files.metadata_url("abc").unwrap();
        assert_eq!(url.path(), "/api/files");
        assert!(url.query_pairs().any(|(k, v)| k == "id" && v == "abc"));
    }

    #[test]
    fn test_relay_resumable_requests_carry_fresh_token() {
        let files = relay();
        let start = files.upload_endpoint(true).unwrap();
        assert_eq!(start.path(), "/api/upload/files");
        assert_eq!(start.query_pairs().filter(|(k, _)| k == "token").count(), 1);

        let session = files
            .session_url("https://upload.example.com/upload/v1beta/files?upload_id=XYZ")
            .unwrap();
        assert!(!session.query_pairs().any(|(k, _)| k == "token"));

        let request = files.session_request_url(session.as_str()).unwrap();
        assert_eq!(request.path(), "/api/upload/files");
        assert!(request.query_pairs().any(|(k, v)| k == "upload_id" && v == "XYZ"));
        let token = request
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let now = crate::api::token::utc_timestamp();
        assert!(crate::api::token::verify_token("pw", &token, now));

        // A stale token is replaced rather than repeated
        let again = files.session_request_url(request.as_str()).unwrap();
        assert_eq!(again.query_pairs().filter(|(k, _)| k == "token").count(), 1);
    }

    #[test]
    fn test_direct_session_requests_have_no_token() {
        let files = direct();
        let session = "https://upload.example.com/upload/v1beta/files?upload_id=XYZ";
        assert_eq!(files.session_request_url(session).unwrap().as_str(), session);
    }

    #[test]
    fn test_relay_rewrites_session_url() {
        let files = relay();
        let url = files
            .session_url("https://upload.example.com/upload/v1beta/files?upload_id=XYZ")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://chat.example.com/api/upload/files?upload_id=XYZ"
        );
    }

    #[test]
    fn test_parse_envelope() {
        let meta = parse_envelope(r#"{"file":{"name":"files/a","state":"ACTIVE"}}"#).unwrap();
        assert_eq!(meta.file_id(), "a");
        assert!(parse_envelope("{}").is_err());
    }
}
