use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("decode error: {0}")]
    Decode(&'static str),
    #[error("no index segment covers block {block}")]
    IndexUnavailable { block: u64 },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("block {block} outside segment range [{low}, {high})")]
    RangeViolation { block: u64, low: u64, high: u64 },
    #[error("non-monotonic block stream: last {last}, got {got}")]
    NonMonotonic { last: u64, got: u64 },
    #[error("segment at {low} failed to flush and must be retried first")]
    FlushPending { low: u64 },
}

impl Error {
    /// Store hiccups worth retrying with backoff. A missing index is not one of them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Timeout { .. })
    }

    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable { .. })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
