use std::sync::Arc;

use crate::config::Config;
use crate::domain::request::FilterRequest;
use crate::error::Result;
use crate::filter::CombinedFilter;
use crate::ingest::SegmentIndexer;
use crate::metrics::IndexCounters;
use crate::query::provider::SegmentIndexProvider;
use crate::query::stream::{BlockSource, FilteredStream};
use crate::store::cache::SegmentCache;
use crate::store::traits::SegmentStore;
use crate::transform::TransformChain;

/// One segment store plus the state shared by everything built on it: the
/// decoded-segment cache and the counters.
pub struct BlockFilterIndex {
    store: Arc<dyn SegmentStore>,
    config: Config,
    cache: Arc<SegmentCache>,
    counters: Arc<IndexCounters>,
}

impl BlockFilterIndex {
    pub fn new(store: Arc<dyn SegmentStore>, config: Config) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(SegmentCache::new(config.segment_cache_capacity));
        Ok(Self {
            store,
            config,
            cache,
            counters: Arc::new(IndexCounters::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &Arc<IndexCounters> {
        &self.counters
    }

    pub fn cache(&self) -> &Arc<SegmentCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    /// A single writer for the configured kind and size. Run at most one per
    /// store and kind.
    pub fn indexer(&self) -> Result<SegmentIndexer> {
        Ok(SegmentIndexer::from_config(Arc::clone(&self.store), &self.config)?
            .with_counters(Arc::clone(&self.counters)))
    }

    pub fn provider(&self, filter: &CombinedFilter) -> Result<Option<SegmentIndexProvider>> {
        let provider = filter.compile_index_provider(Some(Arc::clone(&self.store)), &self.config)?;
        Ok(provider.map(|p| {
            p.with_cache(Arc::clone(&self.cache))
                .with_counters(Arc::clone(&self.counters))
        }))
    }

    /// A filter session for `request`, index-assisted when possible.
    pub fn stream(
        &self,
        source: Arc<dyn BlockSource>,
        request: &FilterRequest,
    ) -> Result<FilteredStream> {
        let chain = TransformChain::from_request(request)?;
        let provider = match chain.filter() {
            Some(filter) => self.provider(filter)?,
            None => None,
        };
        let mut stream = FilteredStream::new(source, chain)
            .with_prefetch(self.config.prefetch_blocks)
            .with_counters(Arc::clone(&self.counters));
        if let Some(provider) = provider {
            stream = stream.with_provider(provider);
        }
        Ok(stream)
    }
}
