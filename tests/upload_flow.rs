//! Attachment uploads against an in-memory file service

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use gemini_talk::api::files::{FileService, UploadRequest};
use gemini_talk::api::ApiError;
use gemini_talk::types::file::{FileMetadata, FileState};
use gemini_talk::types::message::Part;
use gemini_talk::upload::{
    AttachmentStore, AttachmentUploader, StatusPoller, UploadError, UploadFile, UploadManager,
};

/// Keeps uploaded bytes per session; files become active after `checks` lookups
struct FakeProvider {
    data: Mutex<Vec<u8>>,
    checks: Mutex<u32>,
    log: Mutex<Vec<String>>,
    drop_connection_at: Mutex<Option<u64>>,
}

impl FakeProvider {
    fn new(checks: u32) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(Vec::new()),
            checks: Mutex::new(checks),
            log: Mutex::new(Vec::new()),
            drop_connection_at: Mutex::new(None),
        })
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn file(request_name: &str, state: FileState) -> FileMetadata {
        serde_json::from_value(serde_json::json!({
            "name": "files/f-1",
            "displayName": request_name,
            "mimeType": "video/mp4",
            "uri": "https://provider.example.com/v1beta/files/f-1",
            "state": state,
        }))
        .unwrap()
    }
}

#[async_trait]
impl FileService for FakeProvider {
    async fn upload_multipart(
        &self,
        request: &UploadRequest,
        data: Vec<u8>,
    ) -> Result<FileMetadata, ApiError> {
        self.record(format!("multipart {}", data.len()));
        Ok(Self::file(&request.display_name, FileState::Processing))
    }

    async fn start_resumable(&self, request: &UploadRequest) -> Result<String, ApiError> {
        self.record(format!("start {}", request.size));
        Ok(format!("https://upload.example.com/session/{}", request.display_name))
    }

    async fn upload_chunk(
        &self,
        _session_url: &str,
        offset: u64,
        data: Vec<u8>,
        finalize: bool,
    ) -> Result<Option<FileMetadata>, ApiError> {
        {
            let mut drop_at = self.drop_connection_at.lock().unwrap();
            if *drop_at == Some(offset) {
                *drop_at = None;
                return Err(ApiError::InvalidRequest("connection dropped".to_string()));
            }
        }
        let mut stored = self.data.lock().unwrap();
        assert_eq!(stored.len() as u64, offset, "ranges must arrive in order");
        stored.extend(data);
        self.record(format!("chunk {} {}", offset, finalize));
        Ok(finalize.then(|| Self::file("big.mp4", FileState::Processing)))
    }

    async fn query_session(&self, _session_url: &str) -> Result<u64, ApiError> {
        Ok(self.data.lock().unwrap().len() as u64)
    }

    async fn get_metadata(&self, _file_id: &str) -> Result<FileMetadata, ApiError> {
        let mut checks = self.checks.lock().unwrap();
        let state = if *checks == 0 {
            FileState::Active
        } else {
            *checks -= 1;
            FileState::Processing
        };
        Ok(Self::file("clip.mp4", state))
    }
}

fn uploader(provider: Arc<FakeProvider>, chunk_size: u64) -> AttachmentUploader {
    AttachmentUploader::new(
        UploadManager::new(provider.clone())
            .with_chunk_size(chunk_size)
            .unwrap(),
        StatusPoller::new(provider).with_interval(Duration::from_millis(10)),
        AttachmentStore::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_resumable_upload_then_processing() {
    let provider = FakeProvider::new(3);
    let uploader = uploader(provider.clone(), 1024 * 1024);
    let data: Vec<u8> = (0..6 * 1024 * 1024 + 11).map(|i| (i % 7) as u8).collect();
    let file = UploadFile::from_bytes("big.mp4", "video/mp4", data.clone());

    let info = uploader.upload(file, &|_: &str| {}).await.unwrap();

    assert_eq!(info.status, FileState::Active);
    assert_eq!(*provider.data.lock().unwrap(), data);
    let log = provider.log.lock().unwrap().clone();
    assert_eq!(log.first().map(String::as_str), Some("start 6291467"));
    assert_eq!(log.len(), 1 + 7);
    assert_eq!(log.last().map(String::as_str), Some("chunk 6291456 true"));

    match uploader.store().parts().as_slice() {
        [Part::FileData { file_data }] => {
            assert_eq!(file_data.file_uri, "https://provider.example.com/v1beta/files/f-1");
        }
        other => panic!("unexpected parts: {:?}", other),
    }
    assert!(!uploader.store().is_uploading());
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_upload_resumes_from_confirmed_offset() {
    let provider = FakeProvider::new(0);
    *provider.drop_connection_at.lock().unwrap() = Some(2 * 1024 * 1024);
    let manager = UploadManager::new(provider.clone())
        .with_chunk_size(1024 * 1024)
        .unwrap();
    let data = vec![9u8; 5 * 1024 * 1024];
    let file = UploadFile::from_bytes("big.mp4", "video/mp4", data.clone());

    let err = manager.upload(&file).await.unwrap_err();
    let (session, offset) = err.resume_point().unwrap();
    assert_eq!(offset, 2 * 1024 * 1024);
    assert!(session.ends_with("/session/big.mp4"));

    manager.resume(session, &file).await.unwrap();
    assert_eq!(*provider.data.lock().unwrap(), data);
}

#[tokio::test(start_paused = true)]
async fn test_errors_reach_the_callback() {
    let provider = FakeProvider::new(0);
    let uploader = uploader(provider.clone(), 1024 * 1024).with_upload_limit(1024);
    let errors = Mutex::new(Vec::new());
    let on_error = |message: &str| errors.lock().unwrap().push(message.to_string());

    let files = vec![
        UploadFile::from_bytes("ok.txt", "text/plain", b"fine".to_vec()),
        UploadFile::from_bytes("huge.txt", "text/plain", vec![b'x'; 4096]),
    ];
    let results = uploader.upload_all(files, &on_error).await;

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(UploadError::TooLarge(1024))));
    assert_eq!(
        *errors.lock().unwrap(),
        vec!["File size larger than 1.00 KB limit!".to_string()]
    );
    assert_eq!(provider.log.lock().unwrap().clone(), vec!["multipart 4"]);
}
