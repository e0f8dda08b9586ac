use roaring::RoaringBitmap;

use crate::domain::keys::{KeyMode, KeyOrigin, index_key};
use crate::segment::{BitmapLookup, BitmapSegment};

/// Approximate, segment-level predicate: which blocks of a segment may hold a
/// match. Implementations may over-include but must never drop a block the
/// exact filter would keep.
pub trait SegmentMatcher: Send + Sync {
    /// Offsets from the segment's low boundary of candidate blocks.
    fn matching_offsets(&self, lookup: &dyn BitmapLookup) -> RoaringBitmap;

    fn matching_blocks(&self, segment: &BitmapSegment) -> Vec<u64> {
        self.matching_offsets(segment)
            .iter()
            .map(|off| segment.block_at(off))
            .collect()
    }
}

/// One filter clause translated to index keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyClause {
    pub addresses: Vec<String>,
    pub signatures: Vec<String>,
}

impl KeyClause {
    pub fn new<'a, A, S>(mode: KeyMode, origin: KeyOrigin, addresses: A, signatures: S) -> Self
    where
        A: IntoIterator<Item = &'a [u8]>,
        S: IntoIterator<Item = &'a [u8]>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .map(|a| index_key(mode, origin, a))
                .collect(),
            signatures: signatures
                .into_iter()
                .map(|s| index_key(mode, origin, s))
                .collect(),
        }
    }
}

/// OR over clauses; within a clause, OR per dimension and AND across the two
/// dimensions. The AND is per block, not per log or call, so a block with a
/// matching address in one log and a matching signature in another still
/// counts as a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMatcher {
    clauses: Vec<KeyClause>,
}

impl IndexMatcher {
    pub fn new(clauses: Vec<KeyClause>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[KeyClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl SegmentMatcher for IndexMatcher {
    fn matching_offsets(&self, lookup: &dyn BitmapLookup) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for clause in &self.clauses {
            let hits = match (clause.addresses.is_empty(), clause.signatures.is_empty()) {
                (true, true) => continue,
                (false, true) => union_of(lookup, &clause.addresses),
                (true, false) => union_of(lookup, &clause.signatures),
                (false, false) => {
                    union_of(lookup, &clause.addresses) & union_of(lookup, &clause.signatures)
                }
            };
            out |= hits;
        }
        out
    }
}

fn union_of(lookup: &dyn BitmapLookup, keys: &[String]) -> RoaringBitmap {
    let mut out = RoaringBitmap::new();
    for key in keys {
        if let Some(bitmap) = lookup.lookup(key) {
            out |= bitmap;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> BitmapSegment {
        let mut seg = BitmapSegment::new(100, 10).expect("segment");
        seg.add("addr_a", 100).expect("add");
        seg.add("sig_x", 100).expect("add");
        seg.add("addr_a", 103).expect("add");
        seg.add("addr_b", 104).expect("add");
        seg.add("sig_x", 104).expect("add");
        seg.add("sig_y", 105).expect("add");
        seg
    }

    fn clause(addresses: &[&str], signatures: &[&str]) -> KeyClause {
        KeyClause {
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
            signatures: signatures.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn address_only_is_union() {
        let m = IndexMatcher::new(vec![clause(&["addr_a", "addr_b"], &[])]);
        assert_eq!(m.matching_blocks(&segment()), vec![100, 103, 104]);
    }

    #[test]
    fn signature_only_is_union() {
        let m = IndexMatcher::new(vec![clause(&[], &["sig_x", "sig_y", "sig_missing"])]);
        assert_eq!(m.matching_blocks(&segment()), vec![100, 104, 105]);
    }

    #[test]
    fn both_dimensions_intersect() {
        let m = IndexMatcher::new(vec![clause(&["addr_a"], &["sig_x"])]);
        assert_eq!(m.matching_blocks(&segment()), vec![100]);
    }

    #[test]
    fn clauses_are_ored() {
        let m = IndexMatcher::new(vec![
            clause(&["addr_a"], &["sig_x"]),
            clause(&[], &["sig_y"]),
        ]);
        assert_eq!(m.matching_blocks(&segment()), vec![100, 105]);
    }

    #[test]
    fn unknown_keys_match_nothing() {
        let m = IndexMatcher::new(vec![clause(&["nobody"], &[])]);
        assert!(m.matching_offsets(&segment()).is_empty());
        assert!(IndexMatcher::default().matching_blocks(&segment()).is_empty());
    }

    #[test]
    fn key_clause_uses_origin_tags() {
        let addr = [0x01u8; 20];
        let sig = [0xa9u8, 0x05, 0x9c, 0xbb];
        let c = KeyClause::new(
            KeyMode::Tagged,
            KeyOrigin::Call,
            [&addr[..]],
            [&sig[..]],
        );
        assert_eq!(c.addresses, vec![format!("call:{}", "01".repeat(20))]);
        assert_eq!(c.signatures, vec!["call:a9059cbb".to_string()]);
    }
}
