//! In-memory bitmap segment: key -> set of block numbers in `[low, low + size)`.
//!
//! Block numbers are stored as `u32` offsets from `low`, so a segment can span
//! at most `u32::MAX` blocks.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::ops::Range;

use bytes::Bytes;
use roaring::RoaringBitmap;

use crate::codec::segment::{decode_segment, encode_segment};
use crate::error::{Error, Result};

/// Per-key bitmap access used by index matchers. Bitmaps hold offsets from
/// the segment's low boundary.
pub trait BitmapLookup {
    fn lookup(&self, key: &str) -> Option<&RoaringBitmap>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmapSegment {
    low: u64,
    size: u64,
    entries: BTreeMap<String, RoaringBitmap>,
}

impl BitmapSegment {
    pub fn new(low: u64, size: u64) -> Result<Self> {
        if size == 0 || size > u64::from(u32::MAX) {
            return Err(Error::InvalidConfig(format!(
                "segment size {size} must be in 1..={}",
                u32::MAX
            )));
        }
        if low.checked_add(size).is_none() {
            return Err(Error::InvalidConfig(format!(
                "segment [{low}, {low} + {size}) overflows u64"
            )));
        }
        Ok(Self {
            low,
            size,
            entries: BTreeMap::new(),
        })
    }

    pub(crate) fn from_parts(
        low: u64,
        size: u64,
        entries: BTreeMap<String, RoaringBitmap>,
    ) -> Result<Self> {
        let mut seg = Self::new(low, size).map_err(|_| Error::Decode("segment bounds"))?;
        for bitmap in entries.values() {
            if bitmap.max().is_some_and(|max| u64::from(max) >= size) {
                return Err(Error::Decode("bitmap offset outside segment"));
            }
        }
        seg.entries = entries;
        Ok(seg)
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn high(&self) -> u64 {
        self.low + self.size
    }

    pub fn range(&self) -> Range<u64> {
        self.low..self.high()
    }

    pub fn contains_block(&self, block_num: u64) -> bool {
        self.range().contains(&block_num)
    }

    /// Record that `key` occurred in `block_num`. Repeated adds are no-ops.
    pub fn add(&mut self, key: &str, block_num: u64) -> Result<()> {
        let offset = self.offset_of(block_num).ok_or(Error::RangeViolation {
            block: block_num,
            low: self.low,
            high: self.high(),
        })?;
        match self.entries.get_mut(key) {
            Some(bitmap) => {
                bitmap.insert(offset);
            }
            None => {
                let mut bitmap = RoaringBitmap::new();
                bitmap.insert(offset);
                self.entries.insert(key.to_string(), bitmap);
            }
        }
        Ok(())
    }

    /// Block numbers recorded for `key`, ascending. `None` if the key never occurred.
    pub fn blocks(&self, key: &str) -> Option<Vec<u64>> {
        self.entries
            .get(key)
            .map(|bitmap| bitmap.iter().map(|off| self.block_at(off)).collect())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, RoaringBitmap> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offset_of(&self, block_num: u64) -> Option<u32> {
        if !self.contains_block(block_num) {
            return None;
        }
        u32::try_from(block_num - self.low).ok()
    }

    pub fn block_at(&self, offset: u32) -> u64 {
        self.low + u64::from(offset)
    }

    pub fn serialize(&self) -> Result<Bytes> {
        encode_segment(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        decode_segment(bytes)
    }
}

impl BitmapLookup for BitmapSegment {
    fn lookup(&self, key: &str) -> Option<&RoaringBitmap> {
        self.entries.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut once = BitmapSegment::new(100, 10).expect("segment");
        once.add("k", 105).expect("add");

        let mut many = BitmapSegment::new(100, 10).expect("segment");
        for _ in 0..5 {
            many.add("k", 105).expect("add");
        }
        assert_eq!(once, many);
        assert_eq!(many.blocks("k"), Some(vec![105]));
    }

    #[test]
    fn out_of_range_add_is_rejected() {
        let mut seg = BitmapSegment::new(100, 10).expect("segment");
        let err = seg.add("k", 110).expect_err("above range");
        assert!(matches!(
            err,
            Error::RangeViolation {
                block: 110,
                low: 100,
                high: 110
            }
        ));
        assert!(seg.add("k", 99).is_err());
        assert!(seg.lookup("k").is_none(), "rejected add must not create the key");
    }

    #[test]
    fn absent_key_is_distinct_from_present() {
        let mut seg = BitmapSegment::new(0, 10).expect("segment");
        seg.add("present", 3).expect("add");
        assert!(seg.lookup("absent").is_none());
        let bm = seg.lookup("present").expect("present");
        assert!(bm.contains(3));
        assert_eq!(seg.keys().collect::<Vec<_>>(), vec!["present"]);
    }

    #[test]
    fn rejects_degenerate_bounds() {
        assert!(BitmapSegment::new(0, 0).is_err());
        assert!(BitmapSegment::new(u64::MAX - 1, 10).is_err());
        assert!(BitmapSegment::new(0, u64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn blocks_are_ascending_absolute_numbers() {
        let mut seg = BitmapSegment::new(5_000, 1_000).expect("segment");
        for b in [5_900, 5_001, 5_450, 5_001] {
            seg.add("k", b).expect("add");
        }
        assert_eq!(seg.blocks("k"), Some(vec![5_001, 5_450, 5_900]));
    }
}
