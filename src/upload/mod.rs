//! File upload pipeline
//!
//! Sequencing of multipart and resumable uploads, processing-state polling
//! and the attachment list that tracks both.

pub mod attachments;
pub mod chunk;
pub mod manager;
#[cfg(test)]
pub(crate) mod mock;
pub mod poller;
pub mod source;

use thiserror::Error;

use crate::api::ApiError;
use crate::types::file::format_size;

pub use attachments::{AttachmentStore, AttachmentUploader};
pub use chunk::{DEFAULT_CHUNK_SIZE, MULTIPART_THRESHOLD};
pub use manager::UploadManager;
pub use poller::{FibonacciBackoff, PollHandle, StatusPoller};
pub use source::UploadFile;

fn limit_text(limit: &u64) -> String {
    format_size(*limit)
}

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("File read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("File size larger than {} limit!", limit_text(.0))]
    TooLarge(u64),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Invalid chunk size {0}: must be a non-zero multiple of 256 KiB")]
    InvalidChunkSize(u64),

    /// A resumable upload stopped partway; the session can be resumed
    #[error("Upload interrupted after {offset} bytes: {source}")]
    Interrupted {
        session_url: String,
        offset: u64,
        #[source]
        source: Box<UploadError>,
    },

    #[error("Polling stopped before the file finished processing")]
    Cancelled,
}

impl UploadError {
    /// Session URL and confirmed offset of an interrupted resumable upload
    pub fn resume_point(&self) -> Option<(&str, u64)> {
        match self {
            UploadError::Interrupted {
                session_url,
                offset,
                ..
            } => Some((session_url.as_str(), *offset)),
            _ => None,
        }
    }
}
