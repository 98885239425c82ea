//! File types
//!
//! Remote file metadata, local attachment records and the supported MIME set.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Processing state of a remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    /// Also covers states this client does not know
    #[default]
    #[serde(other)]
    StateUnspecified,
}

impl FileState {
    /// Whether polling should stop at this state
    pub fn is_terminal(self) -> bool {
        !matches!(self, FileState::Processing)
    }
}

/// Error details attached to a failed remote file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatusError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// File record as returned by the file service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Resource name, `files/<id>`
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    /// Byte size; the API encodes int64 as a string
    #[serde(default)]
    pub size_bytes: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub expiration_time: Option<String>,
    #[serde(default)]
    pub sha256_hash: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<FileStatusError>,
}

impl FileMetadata {
    /// Id used by the metadata endpoint, i.e. the name without `files/`
    pub fn file_id(&self) -> &str {
        self.name.strip_prefix("files/").unwrap_or(&self.name)
    }
}

/// Envelope returned by upload and metadata calls
#[derive(Debug, Clone, Deserialize)]
pub struct FileEnvelope {
    pub file: Option<FileMetadata>,
}

/// A local attachment tracked while it uploads and processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub status: FileState,
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
}

impl FileInfo {
    /// New attachment in the `PROCESSING` state
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        let mime_type = mime_type.into();
        Self {
            id: attachment_id(&name, &mime_type),
            name,
            mime_type,
            size,
            status: FileState::Processing,
            metadata: None,
        }
    }
}

/// Stable attachment id; the same file added twice maps to the same id.
pub fn attachment_id(name: &str, mime_type: &str) -> String {
    BASE64_STANDARD.encode(format!("{}:{}:{}", name, mime_type, mime_type))
}

pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

pub const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/wav",
    "audio/mp3",
    "audio/aiff",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
];

pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/mpeg",
    "video/mov",
    "video/avi",
    "video/x-flv",
    "video/mpg",
    "video/webm",
    "video/wmv",
    "video/3gpp",
];

pub const TEXT_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "text/css",
    "text/javascript",
    "application/x-javascript",
    "text/x-typescript",
    "application/x-typescript",
    "text/csv",
    "text/markdown",
    "text/x-python",
    "application/x-python-code",
    "application/json",
    "text/xml",
    "application/rtf",
    "text/rtf",
];

/// Whether the file service accepts this MIME type
pub fn is_supported_mime(mime_type: &str) -> bool {
    [
        IMAGE_MIME_TYPES,
        AUDIO_MIME_TYPES,
        VIDEO_MIME_TYPES,
        TEXT_MIME_TYPES,
    ]
    .iter()
    .any(|set| set.contains(&mime_type))
}

/// Guess a MIME type from a file extension
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "wav" => "audio/wav",
        "mp3" => "audio/mp3",
        "aif" | "aiff" => "audio/aiff",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "mpeg" => "video/mpeg",
        "mov" => "video/mov",
        "avi" => "video/avi",
        "flv" => "video/x-flv",
        "mpg" => "video/mpg",
        "webm" => "video/webm",
        "wmv" => "video/wmv",
        "3gp" | "3gpp" => "video/3gpp",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "ts" => "text/x-typescript",
        "csv" => "text/csv",
        "md" | "markdown" => "text/markdown",
        "py" => "text/x-python",
        "json" => "application/json",
        "xml" => "text/xml",
        "rtf" => "application/rtf",
        _ => return None,
    };
    Some(mime)
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{} B", bytes as u64)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}
