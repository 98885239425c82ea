//! Upload sources
//!
//! Files are read range by range, so large uploads never sit in memory whole.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::api::files::UploadRequest;
use crate::types::file::mime_from_extension;
use crate::upload::UploadError;

#[derive(Debug, Clone)]
enum Source {
    Memory(Arc<Vec<u8>>),
    Disk(PathBuf),
}

/// A file queued for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    source: Source,
}

impl UploadFile {
    /// Wrap bytes already in memory
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            source: Source::Memory(Arc::new(data)),
        }
    }

    /// Reference a file on disk, guessing its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_from_extension(&extension)
            .ok_or_else(|| UploadError::UnsupportedType(format!("{} ({})", name, extension)))?;

        Ok(Self {
            name,
            mime_type: mime_type.to_string(),
            size: metadata.len(),
            source: Source::Disk(path.to_path_buf()),
        })
    }

    pub fn request(&self) -> UploadRequest {
        UploadRequest {
            display_name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }

    /// Read `len` bytes at `offset`
    pub async fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, UploadError> {
        match &self.source {
            Source::Memory(data) => {
                let start = (offset as usize).min(data.len());
                let end = (offset.saturating_add(len) as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Source::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = Vec::with_capacity(len as usize);
                file.take(len).read_to_end(&mut buf).await?;
                if (buf.len() as u64) < len {
                    return Err(UploadError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("{} changed size during upload", self.name),
                    )));
                }
                Ok(buf)
            }
        }
    }

    pub async fn read_all(&self) -> Result<Vec<u8>, UploadError> {
        self.read_range(0, self.size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ranges() {
        let file = UploadFile::from_bytes("a.txt", "text/plain", b"0123456789".to_vec());
        assert_eq!(file.size, 10);
        assert_eq!(file.read_range(2, 3).await.unwrap(), b"234");
        assert_eq!(file.read_range(8, 10).await.unwrap(), b"89");
        assert_eq!(file.read_all().await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_disk_ranges_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, b"# Title\nbody").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.md");
        assert_eq!(file.mime_type, "text/markdown");
        assert_eq!(file.size, 12);
        assert_eq!(file.read_range(2, 5).await.unwrap(), b"Title");
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        tokio::fs::write(&path, b"PK").await.unwrap();
        assert!(matches!(
            UploadFile::from_path(&path).await,
            Err(UploadError::UnsupportedType(_))
        ));
    }
}
