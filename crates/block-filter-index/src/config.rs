use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::keys::IndexKind;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 25,
            max_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segment size used when building new segments.
    pub index_size: u64,
    /// Sizes probed, in order, when locating an existing segment. Older
    /// deployments may have indexed at other granularities.
    pub possible_index_sizes: Vec<u64>,
    pub index_kind: IndexKind,
    /// Bound on a single store operation. Zero disables the bound.
    pub store_timeout_ms: u64,
    /// How many candidate blocks the stream engine fetches concurrently.
    pub prefetch_blocks: usize,
    /// Decoded segments kept in memory, shared by every session.
    pub segment_cache_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_size: 1_000,
            possible_index_sizes: vec![100_000, 10_000, 1_000, 100],
            index_kind: IndexKind::Combined,
            store_timeout_ms: 30_000,
            prefetch_blocks: 16,
            segment_cache_capacity: 64,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidConfig(format!("parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::InvalidConfig(format!("read {}: {e}", path.as_ref().display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_size == 0 {
            return Err(Error::InvalidConfig("index_size must be non-zero".to_string()));
        }
        if self.possible_index_sizes.is_empty() {
            return Err(Error::InvalidConfig(
                "possible_index_sizes must not be empty".to_string(),
            ));
        }
        if self.possible_index_sizes.contains(&0) {
            return Err(Error::InvalidConfig(
                "possible_index_sizes must not contain zero".to_string(),
            ));
        }
        if self.prefetch_blocks == 0 {
            return Err(Error::InvalidConfig("prefetch_blocks must be non-zero".to_string()));
        }
        if self.segment_cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "segment_cache_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        (self.store_timeout_ms > 0).then(|| Duration::from_millis(self.store_timeout_ms))
    }
}
