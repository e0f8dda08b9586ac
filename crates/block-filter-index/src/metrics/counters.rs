use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IndexCounters {
    pub blocks_indexed: AtomicU64,
    pub segments_flushed: AtomicU64,
    pub flush_failures: AtomicU64,
    pub segment_loads: AtomicU64,
    pub blocks_skipped: AtomicU64,
    pub blocks_decoded: AtomicU64,
    pub blocks_emitted: AtomicU64,
    pub index_fallbacks: AtomicU64,
}

impl IndexCounters {
    pub fn inc_indexed(&self) {
        let _ = self.blocks_indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_flushed(&self) {
        let _ = self.segments_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_flush_failure(&self) {
        let _ = self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_segment_load(&self) {
        let _ = self.segment_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: u64) {
        let _ = self.blocks_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_decoded(&self) {
        let _ = self.blocks_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_emitted(&self) {
        let _ = self.blocks_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback(&self) {
        let _ = self.index_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            blocks_indexed: self.blocks_indexed.load(Ordering::Relaxed),
            segments_flushed: self.segments_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            segment_loads: self.segment_loads.load(Ordering::Relaxed),
            blocks_skipped: self.blocks_skipped.load(Ordering::Relaxed),
            blocks_decoded: self.blocks_decoded.load(Ordering::Relaxed),
            blocks_emitted: self.blocks_emitted.load(Ordering::Relaxed),
            index_fallbacks: self.index_fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub blocks_indexed: u64,
    pub segments_flushed: u64,
    pub flush_failures: u64,
    pub segment_loads: u64,
    pub blocks_skipped: u64,
    pub blocks_decoded: u64,
    pub blocks_emitted: u64,
    pub index_fallbacks: u64,
}
