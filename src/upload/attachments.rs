//! Attachments
//!
//! The attachment list shown next to the prompt, and the orchestration that
//! moves each entry from `PROCESSING` to its final state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;

use crate::types::file::{is_supported_mime, FileInfo, FileMetadata, FileState};
use crate::types::message::Part;
use crate::upload::{PollHandle, StatusPoller, UploadError, UploadFile, UploadManager};

/// Shared list of attachments, unique by id
#[derive(Debug, Clone, Default)]
pub struct AttachmentStore {
    files: Arc<Mutex<Vec<FileInfo>>>,
}

impl AttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FileInfo>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an attachment; returns false if one with the same id exists
    pub fn add(&self, info: FileInfo) -> bool {
        let mut files = self.lock();
        if files.iter().any(|f| f.id == info.id) {
            return false;
        }
        files.push(info);
        true
    }

    /// Claim `info` for upload
    ///
    /// Returns the existing entry when that file is already uploading or
    /// active. A failed or unspecified entry is reset so it can be retried.
    pub fn claim(&self, info: FileInfo) -> Option<FileInfo> {
        let mut files = self.lock();
        match files.iter_mut().find(|f| f.id == info.id) {
            Some(existing)
                if matches!(existing.status, FileState::Processing | FileState::Active) =>
            {
                Some(existing.clone())
            }
            Some(existing) => {
                *existing = info;
                None
            }
            None => {
                files.push(info);
                None
            }
        }
    }

    pub fn update(&self, id: &str, apply: impl FnOnce(&mut FileInfo)) -> bool {
        match self.lock().iter_mut().find(|f| f.id == id) {
            Some(info) => {
                apply(info);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) -> Option<FileInfo> {
        let mut files = self.lock();
        let index = files.iter().position(|f| f.id == id)?;
        Some(files.remove(index))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn get(&self, id: &str) -> Option<FileInfo> {
        self.lock().iter().find(|f| f.id == id).cloned()
    }

    pub fn files(&self) -> Vec<FileInfo> {
        self.lock().clone()
    }

    /// Whether any attachment is still uploading or processing
    pub fn is_uploading(&self) -> bool {
        self.lock().iter().any(|f| f.status == FileState::Processing)
    }

    /// Message parts referencing every active attachment
    pub fn parts(&self) -> Vec<Part> {
        self.lock()
            .iter()
            .filter(|f| f.status == FileState::Active)
            .filter_map(|f| f.metadata.as_ref())
            .map(|meta| Part::file(meta.mime_type.clone(), meta.uri.clone()))
            .collect()
    }
}

/// Uploads files into an [`AttachmentStore`]
#[derive(Clone)]
pub struct AttachmentUploader {
    manager: UploadManager,
    poller: StatusPoller,
    store: AttachmentStore,
    upload_limit: u64,
}

impl AttachmentUploader {
    pub fn new(manager: UploadManager, poller: StatusPoller, store: AttachmentStore) -> Self {
        Self {
            manager,
            poller,
            store,
            upload_limit: 0,
        }
    }

    /// Reject files above `limit` bytes; 0 disables the check
    pub fn with_upload_limit(mut self, limit: u64) -> Self {
        self.upload_limit = limit;
        self
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Checks made before any request is sent
    pub fn check(&self, file: &UploadFile) -> Result<(), UploadError> {
        if self.upload_limit > 0 && file.size > self.upload_limit {
            return Err(UploadError::TooLarge(self.upload_limit));
        }
        if !is_supported_mime(&file.mime_type) {
            return Err(UploadError::UnsupportedType(file.mime_type.clone()));
        }
        Ok(())
    }

    /// Upload one file and wait for it to finish processing
    ///
    /// Failures mark the attachment `FAILED` and are reported through
    /// `on_error` as well as returned. A file that is already uploading or
    /// active is not uploaded again; a failed one is.
    pub async fn upload<F>(&self, file: UploadFile, on_error: &F) -> Result<FileInfo, UploadError>
    where
        F: Fn(&str) + ?Sized,
    {
        if let Err(e) = self.check(&file) {
            tracing::warn!("Rejected '{}': {}", file.name, e);
            on_error(&e.to_string());
            return Err(e);
        }

        let info = FileInfo::new(file.name.clone(), file.mime_type.clone(), file.size);
        let id = info.id.clone();
        if let Some(existing) = self.store.claim(info.clone()) {
            tracing::debug!("'{}' is already attached", file.name);
            return Ok(existing);
        }

        match self.upload_and_wait(&file).await {
            Ok(metadata) => {
                let state = metadata.state;
                self.store.update(&id, |f| {
                    f.status = state;
                    f.metadata = Some(metadata);
                });
                if state == FileState::Failed {
                    tracing::warn!("Provider failed to process '{}'", file.name);
                }
                Ok(self.store.get(&id).unwrap_or(info))
            }
            Err(e) => {
                tracing::error!("Upload of '{}' failed: {}", file.name, e);
                self.store.update(&id, |f| f.status = FileState::Failed);
                on_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Upload several files concurrently; results keep the input order
    pub async fn upload_all<F>(
        &self,
        files: Vec<UploadFile>,
        on_error: &F,
    ) -> Vec<Result<FileInfo, UploadError>>
    where
        F: Fn(&str) + ?Sized,
    {
        join_all(files.into_iter().map(|file| self.upload(file, on_error))).await
    }

    async fn upload_and_wait(&self, file: &UploadFile) -> Result<FileMetadata, UploadError> {
        let metadata = self.manager.upload(file).await?;
        if metadata.state != FileState::Processing {
            return Ok(metadata);
        }
        tracing::info!("Waiting for '{}' to finish processing", file.name);
        self.poller
            .wait(metadata.file_id(), &PollHandle::new())
            .await
    }
}
