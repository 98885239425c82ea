//! Upload sequencing
//!
//! Small files go up in one multipart request. Anything larger opens a
//! resumable session and sends fixed-size ranges one after another, moving
//! on only when the previous range was accepted. The first failure ends the
//! upload; [`UploadManager::resume`] picks it up again from whatever the
//! session reports as received.

use std::sync::Arc;

use crate::api::files::FileService;
use crate::api::ApiError;
use crate::types::file::FileMetadata;
use crate::upload::chunk::{
    plan_ranges, validate_chunk_size, DEFAULT_CHUNK_SIZE, MULTIPART_THRESHOLD,
};
use crate::upload::{UploadError, UploadFile};

/// Called with (bytes sent, total bytes) after every accepted range
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Sequences uploads against a [`FileService`]
#[derive(Clone)]
pub struct UploadManager {
    service: Arc<dyn FileService>,
    chunk_size: u64,
    progress: Option<ProgressFn>,
}

impl UploadManager {
    pub fn new(service: Arc<dyn FileService>) -> Self {
        Self {
            service,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: None,
        }
    }

    /// Use a different range size; must be a multiple of 256 KiB
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Result<Self, UploadError> {
        validate_chunk_size(chunk_size)?;
        self.chunk_size = chunk_size;
        Ok(self)
    }

    pub fn on_progress(mut self, progress: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn service(&self) -> &Arc<dyn FileService> {
        &self.service
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Upload `file`, choosing the protocol by size
    pub async fn upload(&self, file: &UploadFile) -> Result<FileMetadata, UploadError> {
        if file.size <= MULTIPART_THRESHOLD {
            self.upload_multipart(file).await
        } else {
            self.upload_resumable(file).await
        }
    }

    pub async fn upload_multipart(&self, file: &UploadFile) -> Result<FileMetadata, UploadError> {
        let data = file.read_all().await?;
        let metadata = self.service.upload_multipart(&file.request(), data).await?;
        self.report(file.size, file.size);
        tracing::info!("Uploaded '{}' as {}", file.name, metadata.name);
        Ok(metadata)
    }

    pub async fn upload_resumable(&self, file: &UploadFile) -> Result<FileMetadata, UploadError> {
        let session_url = self.service.start_resumable(&file.request()).await?;
        tracing::info!(
            "Opened upload session for '{}' ({} bytes, {} byte ranges)",
            file.name,
            file.size,
            self.chunk_size
        );
        self.send_ranges(&session_url, file, 0).await
    }

    /// Continue an interrupted session from the offset the service confirms
    pub async fn resume(
        &self,
        session_url: &str,
        file: &UploadFile,
    ) -> Result<FileMetadata, UploadError> {
        let received = self.service.query_session(session_url).await?;
        if received > file.size {
            return Err(UploadError::Api(ApiError::InvalidRequest(format!(
                "session reports {} bytes received but '{}' has {}",
                received, file.name, file.size
            ))));
        }
        tracing::info!(
            "Resuming upload of '{}' at byte {} of {}",
            file.name,
            received,
            file.size
        );
        self.send_ranges(session_url, file, received).await
    }

    async fn send_ranges(
        &self,
        session_url: &str,
        file: &UploadFile,
        start: u64,
    ) -> Result<FileMetadata, UploadError> {
        let interrupted = |offset: u64, source: UploadError| UploadError::Interrupted {
            session_url: session_url.to_string(),
            offset,
            source: Box::new(source),
        };

        for range in plan_ranges(file.size, self.chunk_size, start) {
            let data = file
                .read_range(range.offset, range.len)
                .await
                .map_err(|e| interrupted(range.offset, e))?;

            tracing::debug!(
                "Sending bytes {}..{} of '{}'{}",
                range.offset,
                range.offset + range.len,
                file.name,
                if range.last { " (finalize)" } else { "" }
            );
            let result = self
                .service
                .upload_chunk(session_url, range.offset, data, range.last)
                .await
                .map_err(|e| interrupted(range.offset, e.into()))?;
            self.report(range.offset + range.len, file.size);

            if range.last {
                let metadata = result.ok_or_else(|| {
                    interrupted(
                        range.offset,
                        ApiError::InvalidRequest("File upload fail".to_string()).into(),
                    )
                })?;
                tracing::info!("Finalized upload of '{}' as {}", file.name, metadata.name);
                return Ok(metadata);
            }
        }

        // plan_ranges always ends with a finalizing range
        Err(interrupted(
            start,
            ApiError::InvalidRequest("File upload fail".to_string()).into(),
        ))
    }

    fn report(&self, sent: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(sent, total);
        }
    }
}
