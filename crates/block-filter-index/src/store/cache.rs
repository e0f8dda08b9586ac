use std::sync::Arc;

use quick_cache::sync::Cache;

use crate::domain::keys::SegmentId;
use crate::segment::BitmapSegment;

/// Decoded segments shared across filter sessions. Published segments never
/// change, so an entry stays valid for as long as it is cached.
pub struct SegmentCache {
    inner: Cache<SegmentId, Arc<BitmapSegment>>,
}

impl SegmentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Cache::new(capacity.max(1)),
        }
    }

    pub fn get(&self, id: &SegmentId) -> Option<Arc<BitmapSegment>> {
        self.inner.get(id)
    }

    pub fn insert(&self, id: SegmentId, segment: Arc<BitmapSegment>) {
        self.inner.insert(id, segment);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.inner.hits()
    }

    pub fn misses(&self) -> u64 {
        self.inner.misses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::IndexKind;

    #[test]
    fn counts_hits_and_misses() {
        let cache = SegmentCache::new(4);
        let id = SegmentId::covering(10, 10, IndexKind::Combined);
        assert!(cache.get(&id).is_none());

        let seg = Arc::new(BitmapSegment::new(10, 10).expect("segment"));
        cache.insert(id, Arc::clone(&seg));
        let got = cache.get(&id).expect("cached");
        assert!(Arc::ptr_eq(&got, &seg));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }
}
