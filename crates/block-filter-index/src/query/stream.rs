use std::collections::BTreeMap;
use std::ops::Range;
use std::pin::pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::keys::low_boundary;
use crate::domain::request::FilterRequest;
use crate::domain::types::Block;
use crate::error::{Error, Result};
use crate::metrics::IndexCounters;
use crate::query::provider::SegmentIndexProvider;
use crate::store::traits::SegmentStore;
use crate::transform::TransformChain;

/// Decoded blocks by number. `Ok(None)` means the source has no such block.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn get_block(&self, number: u64) -> Result<Option<Block>>;
}

#[derive(Debug, Default)]
pub struct InMemoryBlockSource {
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl InMemoryBlockSource {
    pub fn insert(&self, block: Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| Error::Backend("lock poisoned".to_string()))?;
        blocks.insert(block.number, block);
        Ok(())
    }
}

impl FromIterator<Block> for InMemoryBlockSource {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self {
            blocks: RwLock::new(iter.into_iter().map(|b| (b.number, b)).collect()),
        }
    }
}

#[async_trait]
impl BlockSource for InMemoryBlockSource {
    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| Error::Backend("lock poisoned".to_string()))?;
        Ok(blocks.get(&number).cloned())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Blocks never fetched because the index ruled them out.
    pub blocks_skipped: u64,
    pub blocks_decoded: u64,
    pub blocks_emitted: u64,
    /// Index lookups that failed and were answered by exact filtering.
    pub index_fallbacks: u64,
}

/// Filtered, in-order delivery of a block range.
///
/// With a provider, candidate blocks come from the index and whole ranges
/// without candidates are skipped. Any index failure is answered by decoding
/// the affected blocks and filtering them exactly, so a true match is never
/// dropped.
pub struct FilteredStream {
    source: Arc<dyn BlockSource>,
    chain: TransformChain,
    provider: Option<SegmentIndexProvider>,
    prefetch: usize,
    counters: Arc<IndexCounters>,
}

impl FilteredStream {
    pub fn new(source: Arc<dyn BlockSource>, chain: TransformChain) -> Self {
        Self {
            source,
            chain,
            provider: None,
            prefetch: Config::default().prefetch_blocks,
            counters: Arc::new(IndexCounters::default()),
        }
    }

    /// Compile `request` and attach an index provider when the filter can
    /// use one.
    pub fn from_request(
        source: Arc<dyn BlockSource>,
        request: &FilterRequest,
        store: Option<Arc<dyn SegmentStore>>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let chain = TransformChain::from_request(request)?;
        let provider = match chain.filter() {
            Some(filter) => filter.compile_index_provider(store, config)?,
            None => None,
        };
        let mut stream = Self::new(source, chain).with_prefetch(config.prefetch_blocks);
        stream.provider = provider;
        Ok(stream)
    }

    pub fn with_provider(mut self, provider: SegmentIndexProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Shared with the provider so segment loads land in the same counters.
    pub fn with_counters(mut self, counters: Arc<IndexCounters>) -> Self {
        self.provider = self
            .provider
            .take()
            .map(|p| p.with_counters(Arc::clone(&counters)));
        self.counters = counters;
        self
    }

    pub fn uses_index(&self) -> bool {
        self.provider.is_some()
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    /// Deliver every block of `range` that survives the transform chain, in
    /// block-number order.
    pub async fn run<F>(&mut self, range: Range<u64>, mut emit: F) -> Result<StreamStats>
    where
        F: FnMut(Block) -> Result<()>,
    {
        let mut stats = StreamStats::default();
        let mut cursor = range.start;
        let mut exact_until = range.start;

        while cursor < range.end {
            let batch = self
                .next_batch(&mut cursor, &mut exact_until, range.end, &mut stats)
                .await;
            if batch.is_empty() {
                continue;
            }

            let source = Arc::clone(&self.source);
            let mut fetched = pin!(
                futures::stream::iter(batch)
                    .map(|number| {
                        let source = Arc::clone(&source);
                        async move { (number, source.get_block(number).await) }
                    })
                    .buffered(self.prefetch)
            );

            while let Some((number, block)) = fetched.next().await {
                let Some(block) = block? else {
                    debug!(target: "index::stream", block = number, "block missing from source");
                    continue;
                };
                stats.blocks_decoded += 1;
                self.counters.inc_decoded();
                if let Some(out) = self.chain.apply(block) {
                    emit(out)?;
                    stats.blocks_emitted += 1;
                    self.counters.inc_emitted();
                }
            }
        }

        debug!(
            target: "index::stream",
            start = range.start,
            end = range.end,
            skipped = stats.blocks_skipped,
            decoded = stats.blocks_decoded,
            emitted = stats.blocks_emitted,
            fallbacks = stats.index_fallbacks,
            "stream range done"
        );
        Ok(stats)
    }

    pub async fn collect(&mut self, range: Range<u64>) -> Result<(Vec<Block>, StreamStats)> {
        let mut out = Vec::new();
        let stats = self
            .run(range, |block| {
                out.push(block);
                Ok(())
            })
            .await?;
        Ok((out, stats))
    }

    /// Up to `prefetch` block numbers to decode, advancing `cursor` past
    /// everything examined.
    async fn next_batch(
        &mut self,
        cursor: &mut u64,
        exact_until: &mut u64,
        end: u64,
        stats: &mut StreamStats,
    ) -> Vec<u64> {
        let mut batch = Vec::with_capacity(self.prefetch);
        while *cursor < end && batch.len() < self.prefetch {
            let Some(provider) = self.provider.as_mut() else {
                batch.push(*cursor);
                *cursor += 1;
                continue;
            };
            if *cursor < *exact_until {
                batch.push(*cursor);
                *cursor += 1;
                continue;
            }

            match provider.next_matching(*cursor).await {
                Ok((next, exhausted)) => {
                    let next = next.min(end);
                    let skipped = next - *cursor;
                    stats.blocks_skipped += skipped;
                    self.counters.add_skipped(skipped);
                    *cursor = next;
                    if !exhausted && *cursor < end {
                        batch.push(*cursor);
                        *cursor += 1;
                    }
                }
                Err(e) => {
                    let until = fallback_window(provider, *cursor).min(end);
                    log_fallback(*cursor, until, &e);
                    stats.index_fallbacks += 1;
                    self.counters.inc_fallback();
                    *exact_until = until;
                    batch.push(*cursor);
                    *cursor += 1;
                }
            }
        }
        batch
    }
}

/// End of the smallest candidate segment around `block`: no segment of any
/// candidate size was usable at `block`, so the index is not asked again
/// before then.
fn fallback_window(provider: &SegmentIndexProvider, block: u64) -> u64 {
    let size = provider.possible_sizes().iter().copied().min().unwrap_or(1);
    low_boundary(block, size).saturating_add(size)
}

fn log_fallback(block: u64, until: u64, err: &Error) {
    if err.is_index_unavailable() {
        debug!(target: "index::stream", block, until, "no index for range, filtering exactly");
    } else {
        warn!(
            target: "index::stream",
            block,
            until,
            error = %err,
            retryable = err.is_retryable(),
            "index lookup failed, filtering exactly"
        );
    }
}
