use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::keys::{IndexKind, SegmentId, low_boundary};
use crate::domain::types::Block;
use crate::error::{Error, Result};
use crate::ingest::extractor::KeyExtractor;
use crate::metrics::IndexCounters;
use crate::segment::BitmapSegment;
use crate::store::bounded;
use crate::store::traits::SegmentStore;

/// Builds fixed-size segments from a non-decreasing block stream and
/// publishes each one exactly once.
///
/// A segment is flushed when the first block past its upper bound arrives.
/// If that write fails the sealed segment is kept aside and every further
/// `ingest` is refused with `Error::FlushPending` until `retry_flush`
/// succeeds, so a range is never published incomplete or under the wrong
/// identity.
pub struct SegmentIndexer {
    store: Arc<dyn SegmentStore>,
    kind: IndexKind,
    size: u64,
    extractor: KeyExtractor,
    store_timeout: Option<Duration>,
    current: Option<BitmapSegment>,
    pending: Option<BitmapSegment>,
    sealed_high: Option<u64>,
    last_block: Option<u64>,
    counters: Arc<IndexCounters>,
}

impl SegmentIndexer {
    pub fn new(store: Arc<dyn SegmentStore>, size: u64, kind: IndexKind) -> Result<Self> {
        // Rejects sizes no segment can have.
        BitmapSegment::new(0, size)?;
        Ok(Self {
            store,
            kind,
            size,
            extractor: KeyExtractor::for_kind(kind),
            store_timeout: None,
            current: None,
            pending: None,
            sealed_high: None,
            last_block: None,
            counters: Arc::new(IndexCounters::default()),
        })
    }

    pub fn from_config(store: Arc<dyn SegmentStore>, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(store, config.index_size, config.index_kind)?
            .with_store_timeout(config.store_timeout()))
    }

    pub fn with_store_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_counters(mut self, counters: Arc<IndexCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn current_range(&self) -> Option<Range<u64>> {
        self.current.as_ref().map(BitmapSegment::range)
    }

    pub fn pending_flush(&self) -> Option<SegmentId> {
        self.pending.as_ref().map(|seg| self.segment_id(seg))
    }

    pub fn last_block(&self) -> Option<u64> {
        self.last_block
    }

    pub async fn ingest(&mut self, block: &Block) -> Result<()> {
        if let Some(pending) = &self.pending {
            return Err(Error::FlushPending { low: pending.low() });
        }

        let block_num = block.number;
        if let Some(last) = self.last_block
            && block_num < last
        {
            return Err(Error::NonMonotonic {
                last,
                got: block_num,
            });
        }
        if let Some(sealed_high) = self.sealed_high
            && block_num < sealed_high
        {
            return Err(Error::RangeViolation {
                block: block_num,
                low: sealed_high - self.size,
                high: sealed_high,
            });
        }

        let crosses_boundary = self
            .current
            .as_ref()
            .is_some_and(|seg| block_num >= seg.high());
        if crosses_boundary {
            self.pending = self.current.take();
            self.sealed_high = self.pending.as_ref().map(BitmapSegment::high);
            self.flush_pending().await?;
        }

        if self.current.is_none() {
            self.current = Some(self.open_segment(block_num)?);
        }
        if let Some(segment) = self.current.as_mut() {
            for key in self.extractor.extract(block) {
                segment.add(&key, block_num)?;
            }
        }
        self.last_block = Some(block_num);
        self.counters.inc_indexed();
        Ok(())
    }

    /// Re-attempt a failed flush. Returns the published segment, or `None`
    /// if nothing was pending.
    pub async fn retry_flush(&mut self) -> Result<Option<SegmentId>> {
        self.flush_pending().await
    }

    /// Publish the open segment if its last block has been ingested. A
    /// partially filled segment stays open: publishing it would freeze a
    /// range that later blocks still belong to.
    pub async fn finish(&mut self) -> Result<Option<SegmentId>> {
        if self.pending.is_some() {
            return self.flush_pending().await;
        }
        let complete = match (&self.current, self.last_block) {
            (Some(seg), Some(last)) => last + 1 == seg.high(),
            _ => false,
        };
        if !complete {
            debug!(
                target: "index::ingest",
                range = ?self.current_range(),
                last_block = ?self.last_block,
                "open segment incomplete, not flushing"
            );
            return Ok(None);
        }
        self.pending = self.current.take();
        self.sealed_high = self.pending.as_ref().map(BitmapSegment::high);
        self.flush_pending().await
    }

    fn open_segment(&self, block_num: u64) -> Result<BitmapSegment> {
        let low = low_boundary(block_num, self.size);
        if self.last_block.is_none() && low != block_num {
            warn!(
                target: "index::ingest",
                block = block_num,
                low,
                size = self.size,
                kind = %self.kind,
                "first block is not segment-aligned, snapping segment to boundary"
            );
        }
        debug!(target: "index::ingest", low, size = self.size, kind = %self.kind, "opening segment");
        BitmapSegment::new(low, self.size)
    }

    fn segment_id(&self, segment: &BitmapSegment) -> SegmentId {
        SegmentId {
            low: segment.low(),
            size: self.size,
            kind: self.kind,
        }
    }

    async fn flush_pending(&mut self) -> Result<Option<SegmentId>> {
        let Some(segment) = self.pending.as_ref() else {
            return Ok(None);
        };
        let id = self.segment_id(segment);
        let payload = segment.serialize()?;
        let payload_len = payload.len();
        let key_count = segment.len();

        match bounded(
            "segment write",
            self.store_timeout,
            self.store.write(&id, payload),
        )
        .await
        {
            Ok(()) => {
                info!(
                    target: "index::ingest",
                    segment = %id,
                    keys = key_count,
                    bytes = payload_len,
                    "flushed segment"
                );
                self.pending = None;
                self.counters.inc_flushed();
                Ok(Some(id))
            }
            Err(e) => {
                error!(target: "index::ingest", segment = %id, error = %e, "segment flush failed");
                self.counters.inc_flush_failure();
                Err(e)
            }
        }
    }
}
