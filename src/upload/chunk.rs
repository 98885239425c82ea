//! Byte-range planning for resumable uploads

use crate::upload::UploadError;

/// Files up to this size go up in a single multipart request
pub const MULTIPART_THRESHOLD: u64 = 4_194_304;

/// Resumable ranges must be multiples of this
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// One range of a resumable upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
    /// The range that finalizes the session
    pub last: bool,
}

pub fn validate_chunk_size(chunk_size: u64) -> Result<(), UploadError> {
    if chunk_size == 0 || chunk_size % CHUNK_GRANULARITY != 0 {
        return Err(UploadError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

/// Ranges covering `start..total` in order
///
/// When nothing is left to send a single empty range still finalizes the
/// session.
pub fn plan_ranges(total: u64, chunk_size: u64, start: u64) -> Vec<ByteRange> {
    if start >= total {
        return vec![ByteRange {
            offset: total,
            len: 0,
            last: true,
        }];
    }
    let mut ranges = Vec::new();
    let mut offset = start;
    while offset < total {
        let len = chunk_size.min(total - offset);
        ranges.push(ByteRange {
            offset,
            len,
            last: offset + len >= total,
        });
        offset += len;
    }
    ranges
}
