//! `Content-Range` parsing for chunked uploads.
//!
//! A chunked transfer declares each slice as `bytes <start>-<end>/<total>`
//! (decimal, `start <= end < total`, `end` inclusive). Everything here is
//! pure: headers go in, a [`TransferPlan`] or a [`RangeError`] comes out,
//! and no storage is touched. Size policy is enforced before the assembler
//! ever sees the payload.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Content-Range not allowed for {0}")]
    Malformed(String),
    #[error("File size not allowed. File size: {total} bytes. Max file size allowed: {max} bytes")]
    FileTooLarge { total: u64, max: u64 },
    #[error("Chunk size not allowed. Chunk size: {size} bytes. Max chunk size allowed: {max} bytes")]
    ChunkTooLarge { size: u64, max: u64 },
}

/// One declared byte range out of a larger transfer. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ChunkRange {
    pub fn chunk_size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// The last chunk is the one whose range reaches the declared total.
    pub fn is_last(&self) -> bool {
        self.total <= self.end + 1
    }

    /// Total chunk count for the whole transfer, assuming every chunk but
    /// the last is `max_chunk_size` bytes. Only meaningful on the last
    /// chunk, once `total` is authoritative.
    pub fn total_chunks(&self, max_chunk_size: u64) -> i64 {
        self.total.div_ceil(max_chunk_size) as i64
    }
}

/// Chunking semantics resolved for one incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// Total chunk count, known only once the last chunk declares it.
    pub total_chunks: Option<i64>,
    /// Whether this request finalizes the upload.
    pub last_chunk: bool,
}

/// Whether a request is part of a chunked transfer.
///
/// An absent or blank header means a plain single-shot upload. A present
/// header must match the grammar exactly; anything else is rejected rather
/// than silently treated as non-chunked.
pub fn is_chunked(header: Option<&str>) -> Result<bool, RangeError> {
    match header {
        None => Ok(false),
        Some(h) if h.trim().is_empty() => Ok(false),
        Some(h) => parse(h).map(|_| true),
    }
}

/// Parse a `Content-Range` value into its three fields.
///
/// Strict by design: no whitespace slack, no sign prefixes, and the range
/// must satisfy `start <= end < total`.
pub fn parse(header: &str) -> Result<ChunkRange, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());

    let rest = header.strip_prefix("bytes ").ok_or_else(malformed)?;
    let (range, total) = rest.split_once('/').ok_or_else(malformed)?;
    let (start, end) = range.split_once('-').ok_or_else(malformed)?;

    let start = parse_decimal(start).ok_or_else(malformed)?;
    let end = parse_decimal(end).ok_or_else(malformed)?;
    let total = parse_decimal(total).ok_or_else(malformed)?;

    if start > end || end >= total {
        return Err(malformed());
    }

    Ok(ChunkRange { start, end, total })
}

/// Resolve an optional header plus the actual payload length into a
/// [`TransferPlan`], enforcing the size policy.
///
/// Failure order is fixed: malformed header, then declared total vs
/// `max_file_size`, then chunk size vs `max_chunk_size`. Without a header
/// the payload itself is the whole file and only the file cap applies; the
/// chunk count stays unknown until finalization assigns 1.
pub fn plan_transfer(
    header: Option<&str>,
    payload_len: u64,
    max_file_size: u64,
    max_chunk_size: u64,
) -> Result<TransferPlan, RangeError> {
    if !is_chunked(header)? {
        if payload_len > max_file_size {
            return Err(RangeError::FileTooLarge {
                total: payload_len,
                max: max_file_size,
            });
        }
        return Ok(TransferPlan {
            total_chunks: None,
            last_chunk: true,
        });
    }

    let range = parse(header.unwrap_or_default())?;

    if range.total > max_file_size {
        return Err(RangeError::FileTooLarge {
            total: range.total,
            max: max_file_size,
        });
    }
    if range.chunk_size() > max_chunk_size {
        return Err(RangeError::ChunkTooLarge {
            size: range.chunk_size(),
            max: max_chunk_size,
        });
    }

    let last_chunk = range.is_last();
    Ok(TransferPlan {
        total_chunks: last_chunk.then(|| range.total_chunks(max_chunk_size)),
        last_chunk,
    })
}

/// Parse a non-negative decimal field. Rejects empty strings and anything
/// `u64::from_str` would tolerate beyond plain digits (`+`, whitespace).
fn parse_decimal(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
