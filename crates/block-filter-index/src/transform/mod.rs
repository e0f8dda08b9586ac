pub mod projection;

use std::sync::Arc;

use crate::domain::request::FilterRequest;
use crate::domain::types::Block;
use crate::error::{Error, Result};
use crate::filter::CombinedFilter;

pub use projection::{call_only, header_only};

/// One step applied to every decoded block. `None` means the block is not
/// delivered.
pub trait BlockTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, block: Block) -> Option<Block>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderOnly;

impl BlockTransform for HeaderOnly {
    fn name(&self) -> &'static str {
        "header_only"
    }

    fn transform(&self, block: Block) -> Option<Block> {
        Some(header_only(block))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallOnly;

impl BlockTransform for CallOnly {
    fn name(&self) -> &'static str {
        "call_only"
    }

    fn transform(&self, block: Block) -> Option<Block> {
        Some(call_only(block))
    }
}

/// Filter (if any) followed by projections, in order.
#[derive(Clone, Default)]
pub struct TransformChain {
    filter: Option<Arc<CombinedFilter>>,
    projections: Vec<Arc<dyn BlockTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: CombinedFilter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn push(mut self, step: impl BlockTransform + 'static) -> Self {
        self.projections.push(Arc::new(step));
        self
    }

    /// `header_only` and `call_only` are mutually exclusive.
    pub fn from_request(request: &FilterRequest) -> Result<Self> {
        if request.header_only && request.call_only {
            return Err(Error::InvalidFilter(
                "header_only and call_only cannot both be set".to_string(),
            ));
        }
        let mut chain = Self::new();
        if request.has_clauses() {
            chain = chain.with_filter(CombinedFilter::from_request(request)?);
        }
        if request.header_only {
            chain = chain.push(HeaderOnly);
        } else if request.call_only {
            chain = chain.push(CallOnly);
        }
        Ok(chain)
    }

    pub fn filter(&self) -> Option<&CombinedFilter> {
        self.filter.as_deref()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filter
            .iter()
            .map(|f| f.name())
            .chain(self.projections.iter().map(|p| p.name()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.projections.is_empty()
    }

    pub fn apply(&self, block: Block) -> Option<Block> {
        let mut block = match &self.filter {
            Some(filter) => filter.transform(block)?,
            None => block,
        };
        for step in &self.projections {
            block = step.transform(block)?;
        }
        Some(block)
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("steps", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::{CallToFilterRequest, LogFilterRequest};
    use crate::domain::types::{Call, TransactionTrace};

    fn block_with_call(number: u64, address: [u8; 20]) -> Block {
        Block {
            number,
            transaction_traces: vec![TransactionTrace {
                calls: vec![Call {
                    address,
                    input: vec![1, 2, 3, 4],
                    executed_code: true,
                    ..Call::default()
                }],
                ..TransactionTrace::default()
            }],
            ..Block::default()
        }
    }

    #[test]
    fn empty_request_passes_blocks_through() {
        let chain = TransformChain::from_request(&FilterRequest::default()).expect("chain");
        assert!(chain.is_empty());
        let block = block_with_call(1, [0xaa; 20]);
        assert_eq!(chain.apply(block.clone()), Some(block));
    }

    #[test]
    fn filter_runs_before_projection() {
        let request = FilterRequest {
            call_filters: vec![CallToFilterRequest {
                addresses: vec![vec![0xaa; 20]],
                signatures: vec![],
            }],
            call_only: true,
            ..FilterRequest::default()
        };
        let chain = TransformChain::from_request(&request).expect("chain");
        assert_eq!(chain.names(), vec!["combined_filter", "call_only"]);

        assert!(chain.apply(block_with_call(1, [0xbb; 20])).is_none());
        let out = chain.apply(block_with_call(2, [0xaa; 20])).expect("kept");
        assert!(!out.transaction_traces[0].calls[0].executed_code);
    }

    #[test]
    fn header_only_projection() {
        let request = FilterRequest {
            header_only: true,
            ..FilterRequest::default()
        };
        let chain = TransformChain::from_request(&request).expect("chain");
        let out = chain.apply(block_with_call(3, [0xaa; 20])).expect("kept");
        assert_eq!(out.number, 3);
        assert!(out.transaction_traces.is_empty());
    }

    #[test]
    fn rejects_conflicting_projections_and_bad_clauses() {
        let both = FilterRequest {
            header_only: true,
            call_only: true,
            ..FilterRequest::default()
        };
        assert!(matches!(
            TransformChain::from_request(&both),
            Err(Error::InvalidFilter(_))
        ));

        let bad = FilterRequest {
            log_filters: vec![LogFilterRequest {
                addresses: vec![],
                event_signatures: vec![vec![0x11; 4]],
            }],
            ..FilterRequest::default()
        };
        assert!(TransformChain::from_request(&bad).is_err());
    }
}
