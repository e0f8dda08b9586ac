use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const LOG_ADDR_SIG_SHORTNAME: &str = "logaddrsig";
pub const CALL_ADDR_SIG_SHORTNAME: &str = "calladdrsig";
pub const COMBINED_SHORTNAME: &str = "combi";

const LOG_PREFIX: &str = "log:";
const CALL_PREFIX: &str = "call:";

/// Whether a key came from a receipt log or from a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOrigin {
    Log,
    Call,
}

/// Tagged keys carry their origin so log and call keys can share one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Untagged,
    Tagged,
}

/// Index family. Segments of different kinds never share a storage name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    #[serde(rename = "logaddrsig")]
    LogAddrSig,
    #[serde(rename = "calladdrsig")]
    CallAddrSig,
    #[serde(rename = "combi")]
    Combined,
}

impl IndexKind {
    pub fn shortname(self) -> &'static str {
        match self {
            Self::LogAddrSig => LOG_ADDR_SIG_SHORTNAME,
            Self::CallAddrSig => CALL_ADDR_SIG_SHORTNAME,
            Self::Combined => COMBINED_SHORTNAME,
        }
    }

    pub fn parse(shortname: &str) -> Result<Self> {
        match shortname {
            LOG_ADDR_SIG_SHORTNAME => Ok(Self::LogAddrSig),
            CALL_ADDR_SIG_SHORTNAME => Ok(Self::CallAddrSig),
            COMBINED_SHORTNAME => Ok(Self::Combined),
            _ => Err(Error::InvalidConfig(format!(
                "unknown index kind {shortname:?}"
            ))),
        }
    }

    pub fn key_mode(self) -> KeyMode {
        match self {
            Self::Combined => KeyMode::Tagged,
            Self::LogAddrSig | Self::CallAddrSig => KeyMode::Untagged,
        }
    }

    pub fn covers(self, origin: KeyOrigin) -> bool {
        matches!(
            (self, origin),
            (Self::Combined, _)
                | (Self::LogAddrSig, KeyOrigin::Log)
                | (Self::CallAddrSig, KeyOrigin::Call)
        )
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.shortname())
    }
}

/// Hex key for an address or signature, prefixed with its origin in tagged mode.
pub fn index_key(mode: KeyMode, origin: KeyOrigin, bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    match (mode, origin) {
        (KeyMode::Untagged, _) => hex,
        (KeyMode::Tagged, KeyOrigin::Log) => format!("{LOG_PREFIX}{hex}"),
        (KeyMode::Tagged, KeyOrigin::Call) => format!("{CALL_PREFIX}{hex}"),
    }
}

/// Storage identity of a segment: `[low, low + size)` of one index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId {
    pub low: u64,
    pub size: u64,
    pub kind: IndexKind,
}

impl SegmentId {
    /// Segment of `size` that covers `block_num`, aligned on multiples of `size`.
    pub fn covering(block_num: u64, size: u64, kind: IndexKind) -> Self {
        Self {
            low: low_boundary(block_num, size),
            size,
            kind,
        }
    }

    pub fn high(&self) -> u64 {
        self.low.saturating_add(self.size)
    }

    pub fn contains(&self, block_num: u64) -> bool {
        block_num >= self.low && block_num < self.high()
    }

    pub fn object_name(&self) -> String {
        format!("{:010}.{}.{}.idx", self.low, self.size, self.kind.shortname())
    }

    pub fn parse_object_name(name: &str) -> Result<Self> {
        let stem = name
            .strip_suffix(".idx")
            .ok_or(Error::Decode("segment name missing .idx suffix"))?;
        let mut parts = stem.splitn(3, '.');
        let low = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or(Error::Decode("segment name low"))?;
        let size = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or(Error::Decode("segment name size"))?;
        let kind = parts
            .next()
            .ok_or(Error::Decode("segment name kind"))
            .and_then(|k| IndexKind::parse(k).map_err(|_| Error::Decode("segment name kind")))?;
        Ok(Self { low, size, kind })
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.object_name())
    }
}

pub fn low_boundary(block_num: u64, size: u64) -> u64 {
    block_num - (block_num % size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_is_zero_padded() {
        let id = SegmentId::covering(1_234_567, 1000, IndexKind::Combined);
        assert_eq!(id.low, 1_234_000);
        assert_eq!(id.object_name(), "0001234000.1000.combi.idx");
        assert_eq!(SegmentId::parse_object_name(&id.object_name()).expect("parse"), id);
    }

    #[test]
    fn tagged_keys_carry_origin() {
        let addr = [0xab; 20];
        assert_eq!(
            index_key(KeyMode::Untagged, KeyOrigin::Log, &addr),
            "ab".repeat(20)
        );
        assert_eq!(
            index_key(KeyMode::Tagged, KeyOrigin::Log, &addr),
            format!("log:{}", "ab".repeat(20))
        );
        assert_eq!(
            index_key(KeyMode::Tagged, KeyOrigin::Call, &[1, 2, 3, 4]),
            "call:01020304"
        );
    }

    #[test]
    fn legacy_kinds_cover_one_origin() {
        assert!(IndexKind::LogAddrSig.covers(KeyOrigin::Log));
        assert!(!IndexKind::LogAddrSig.covers(KeyOrigin::Call));
        assert!(IndexKind::CallAddrSig.covers(KeyOrigin::Call));
        assert!(IndexKind::Combined.covers(KeyOrigin::Log));
        assert!(IndexKind::Combined.covers(KeyOrigin::Call));
        assert_eq!(IndexKind::parse("combi").expect("parse"), IndexKind::Combined);
        assert!(IndexKind::parse("bloom").is_err());
    }

    #[test]
    fn segment_range_is_half_open() {
        let id = SegmentId::covering(37, 100, IndexKind::LogAddrSig);
        assert_eq!(id.low, 0);
        assert!(id.contains(0));
        assert!(id.contains(99));
        assert!(!id.contains(100));
    }
}
