use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use roaring::RoaringBitmap;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::keys::{IndexKind, SegmentId};
use crate::error::{Error, Result};
use crate::metrics::IndexCounters;
use crate::query::matcher::SegmentMatcher;
use crate::segment::BitmapSegment;
use crate::store::bounded;
use crate::store::cache::SegmentCache;
use crate::store::traits::SegmentStore;

#[derive(Debug)]
struct LoadedSegment {
    id: SegmentId,
    /// Candidate offsets from `id.low`, computed once per load.
    matches: RoaringBitmap,
}

impl LoadedSegment {
    fn offset_of(&self, block_num: u64) -> Option<u32> {
        if !self.id.contains(block_num) {
            return None;
        }
        u32::try_from(block_num - self.id.low).ok()
    }
}

/// Skip-scan view of the index for one filter session.
///
/// Holds at most one loaded segment and reloads when asked about a block
/// outside it. The cached segment is per-instance state, so each session
/// owns its provider; decoded segments can still be shared through a
/// `SegmentCache`.
pub struct SegmentIndexProvider {
    store: Arc<dyn SegmentStore>,
    possible_sizes: Vec<u64>,
    kind: IndexKind,
    matcher: Box<dyn SegmentMatcher>,
    store_timeout: Option<Duration>,
    cache: Option<Arc<SegmentCache>>,
    counters: Arc<IndexCounters>,
    loaded: Option<LoadedSegment>,
}

impl SegmentIndexProvider {
    pub fn new(
        store: Arc<dyn SegmentStore>,
        possible_sizes: Vec<u64>,
        kind: IndexKind,
        matcher: Box<dyn SegmentMatcher>,
    ) -> Result<Self> {
        if possible_sizes.is_empty() || possible_sizes.contains(&0) {
            return Err(Error::InvalidConfig(
                "index provider needs non-zero candidate sizes".to_string(),
            ));
        }
        Ok(Self {
            store,
            possible_sizes,
            kind,
            matcher,
            store_timeout: None,
            cache: None,
            counters: Arc::new(IndexCounters::default()),
            loaded: None,
        })
    }

    pub fn from_config(
        store: Arc<dyn SegmentStore>,
        config: &Config,
        matcher: Box<dyn SegmentMatcher>,
    ) -> Result<Self> {
        Ok(Self::new(
            store,
            config.possible_index_sizes.clone(),
            config.index_kind,
            matcher,
        )?
        .with_store_timeout(config.store_timeout()))
    }

    pub fn with_store_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: Arc<SegmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_counters(mut self, counters: Arc<IndexCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn possible_sizes(&self) -> &[u64] {
        &self.possible_sizes
    }

    pub fn loaded_range(&self) -> Option<Range<u64>> {
        self.loaded.as_ref().map(|l| l.id.low..l.id.high())
    }

    /// First published segment covering `block_num`, probing candidate sizes
    /// in configured order.
    pub async fn locate(&self, block_num: u64) -> Result<Option<SegmentId>> {
        if let Some(loaded) = &self.loaded
            && loaded.id.contains(block_num)
        {
            return Ok(Some(loaded.id));
        }
        for &size in &self.possible_sizes {
            let id = SegmentId::covering(block_num, size, self.kind);
            if self.cache.as_ref().is_some_and(|c| c.get(&id).is_some()) {
                return Ok(Some(id));
            }
            if bounded("segment exists", self.store_timeout, self.store.exists(&id)).await? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub async fn within_range(&self, block_num: u64) -> Result<bool> {
        Ok(self.locate(block_num).await?.is_some())
    }

    /// Make sure the loaded segment covers `block_num`. Fails with
    /// `IndexUnavailable` when no usable segment exists at any candidate size.
    pub async fn load_if_needed(&mut self, block_num: u64) -> Result<()> {
        if self
            .loaded
            .as_ref()
            .is_some_and(|l| l.id.contains(block_num))
        {
            return Ok(());
        }

        let Some(id) = self.locate(block_num).await? else {
            return Err(Error::IndexUnavailable { block: block_num });
        };
        let segment = self.fetch(&id, block_num).await?;
        let matches = self.matcher.matching_offsets(segment.as_ref());
        debug!(
            target: "index::provider",
            segment = %id,
            candidates = matches.len(),
            "loaded index segment"
        );
        self.loaded = Some(LoadedSegment { id, matches });
        Ok(())
    }

    pub async fn matches(&mut self, block_num: u64) -> Result<bool> {
        self.load_if_needed(block_num).await?;
        let Some(loaded) = &self.loaded else {
            return Err(Error::IndexUnavailable { block: block_num });
        };
        Ok(loaded
            .offset_of(block_num)
            .is_some_and(|off| loaded.matches.contains(off)))
    }

    /// First candidate at or after `block_num` inside the covering segment.
    /// When there is none, returns the segment's upper bound with
    /// `exhausted_range = true` so the caller can jump past the whole range.
    pub async fn next_matching(&mut self, block_num: u64) -> Result<(u64, bool)> {
        self.load_if_needed(block_num).await?;
        let Some(loaded) = &self.loaded else {
            return Err(Error::IndexUnavailable { block: block_num });
        };
        let Some(offset) = loaded.offset_of(block_num) else {
            return Err(Error::IndexUnavailable { block: block_num });
        };

        let before = if offset == 0 {
            0
        } else {
            loaded.matches.rank(offset - 1)
        };
        let next = u32::try_from(before)
            .ok()
            .and_then(|n| loaded.matches.select(n));
        match next {
            Some(off) => Ok((loaded.id.low + u64::from(off), false)),
            None => Ok((loaded.id.high(), true)),
        }
    }

    async fn fetch(&self, id: &SegmentId, block_num: u64) -> Result<Arc<BitmapSegment>> {
        if let Some(segment) = self.cache.as_ref().and_then(|c| c.get(id)) {
            return Ok(segment);
        }

        let bytes = match bounded("segment open", self.store_timeout, self.store.open(id)).await {
            Ok(b) => b,
            Err(Error::NotFound) => return Err(Error::IndexUnavailable { block: block_num }),
            Err(e) => return Err(e),
        };
        let segment = match BitmapSegment::deserialize(&bytes) {
            Ok(s) if s.low() == id.low && s.size() == id.size => s,
            Ok(s) => {
                warn!(
                    target: "index::provider",
                    segment = %id,
                    payload_low = s.low(),
                    payload_size = s.size(),
                    "segment payload does not match its name, ignoring"
                );
                return Err(Error::IndexUnavailable { block: block_num });
            }
            Err(e) => {
                warn!(
                    target: "index::provider",
                    segment = %id,
                    error = %e,
                    "corrupt index segment, treating range as unindexed"
                );
                return Err(Error::IndexUnavailable { block: block_num });
            }
        };

        self.counters.inc_segment_load();
        let segment = Arc::new(segment);
        if let Some(cache) = &self.cache {
            cache.insert(*id, Arc::clone(&segment));
        }
        Ok(segment)
    }
}
