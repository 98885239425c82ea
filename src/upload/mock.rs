//! In-memory file service used by the upload tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::files::{FileService, UploadRequest};
use crate::api::ApiError;
use crate::types::file::{FileMetadata, FileState};

pub(crate) const SESSION_URL: &str = "mock://session/1";

pub(crate) fn metadata(state: FileState) -> FileMetadata {
    FileMetadata {
        name: "files/mock-1".to_string(),
        display_name: None,
        mime_type: "video/mp4".to_string(),
        size_bytes: None,
        create_time: None,
        update_time: None,
        expiration_time: None,
        sha256_hash: None,
        uri: "https://files.example.com/v1beta/files/mock-1".to_string(),
        state,
        error: None,
    }
}

/// Records every call; chunk data lands in `received`
#[derive(Default)]
pub(crate) struct MockFiles {
    pub calls: Mutex<Vec<String>>,
    pub received: Mutex<Vec<u8>>,
    /// Fail the chunk written at this offset, once
    pub fail_at: Mutex<Option<u64>>,
    /// States returned by successive metadata lookups; the last one repeats
    pub states: Mutex<VecDeque<FileState>>,
    /// State reported right after upload
    pub uploaded_state: Option<FileState>,
    pub no_session: bool,
}

impl MockFiles {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn uploaded(&self) -> FileMetadata {
        metadata(self.uploaded_state.unwrap_or(FileState::Active))
    }
}

#[async_trait]
impl FileService for MockFiles {
    async fn upload_multipart(
        &self,
        request: &UploadRequest,
        data: Vec<u8>,
    ) -> Result<FileMetadata, ApiError> {
        self.record(format!("multipart {} {}", request.display_name, data.len()));
        self.received.lock().unwrap().extend(data);
        Ok(self.uploaded())
    }

    async fn start_resumable(&self, request: &UploadRequest) -> Result<String, ApiError> {
        if self.no_session {
            return Err(ApiError::NoUploadUrl);
        }
        self.record(format!("start {}", request.size));
        Ok(SESSION_URL.to_string())
    }

    async fn upload_chunk(
        &self,
        _session_url: &str,
        offset: u64,
        data: Vec<u8>,
        finalize: bool,
    ) -> Result<Option<FileMetadata>, ApiError> {
        {
            let mut fail_at = self.fail_at.lock().unwrap();
            if *fail_at == Some(offset) {
                *fail_at = None;
                return Err(ApiError::Provider {
                    status: 503,
                    message: "backend unavailable".to_string(),
                });
            }
        }
        let verb = if finalize { "finalize" } else { "upload" };
        self.record(format!("{} {} {}", verb, offset, data.len()));
        self.received.lock().unwrap().extend(data);
        Ok(finalize.then(|| self.uploaded()))
    }

    async fn query_session(&self, _session_url: &str) -> Result<u64, ApiError> {
        let received = self.received.lock().unwrap().len() as u64;
        self.record(format!("query {}", received));
        Ok(received)
    }

    async fn get_metadata(&self, file_id: &str) -> Result<FileMetadata, ApiError> {
        self.record(format!("get {}", file_id));
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().copied()
        };
        match state {
            Some(state) => Ok(metadata(state)),
            None => Err(ApiError::Provider {
                status: 404,
                message: "File not found".to_string(),
            }),
        }
    }
}
