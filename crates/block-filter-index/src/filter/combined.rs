use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::domain::keys::{IndexKind, KeyOrigin};
use crate::domain::request::{CallToFilterRequest, FilterRequest, LogFilterRequest};
use crate::domain::types::{Address20, Block, Call, Log, TransactionTrace};
use crate::error::{Error, Result};
use crate::query::matcher::{IndexMatcher, KeyClause};
use crate::query::provider::SegmentIndexProvider;
use crate::store::traits::SegmentStore;
use crate::transform::BlockTransform;
use crate::transform::projection::header_only;

const ADDRESS_LEN: usize = 20;
const EVENT_SIGNATURE_LEN: usize = 32;
const METHOD_SIGNATURE_LEN: usize = 4;

/// One address/signature constraint. An empty set means "any" on that
/// dimension; at least one dimension is always constrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    addresses: BTreeSet<Address20>,
    signatures: BTreeSet<Vec<u8>>,
}

impl FilterClause {
    pub fn new(
        addresses: impl IntoIterator<Item = Address20>,
        signatures: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<Self> {
        let clause = Self {
            addresses: addresses.into_iter().collect(),
            signatures: signatures.into_iter().collect(),
        };
        if clause.addresses.is_empty() && clause.signatures.is_empty() {
            return Err(Error::InvalidFilter(
                "clause needs at least one address or signature".to_string(),
            ));
        }
        Ok(clause)
    }

    pub fn addresses(&self) -> &BTreeSet<Address20> {
        &self.addresses
    }

    pub fn signatures(&self) -> &BTreeSet<Vec<u8>> {
        &self.signatures
    }

    pub fn matches(&self, address: &Address20, signature: Option<&[u8]>) -> bool {
        (self.addresses.is_empty() || self.addresses.contains(address))
            && (self.signatures.is_empty()
                || signature.is_some_and(|sig| self.signatures.contains(sig)))
    }

    fn key_clause(&self, kind: IndexKind, origin: KeyOrigin) -> KeyClause {
        KeyClause::new(
            kind.key_mode(),
            origin,
            self.addresses.iter().map(|a| &a[..]),
            self.signatures.iter().map(Vec::as_slice),
        )
    }
}

/// Call and log clauses compiled from one consumer request.
///
/// `matches_trace` is the exact test: a single log (or a single call) must
/// satisfy both dimensions of one clause. The index matcher built by
/// `index_matcher` only approximates it and is used to skip ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedFilter {
    call_clauses: Vec<FilterClause>,
    log_clauses: Vec<FilterClause>,
    always_emit_header: bool,
}

impl CombinedFilter {
    pub fn new(
        call_clauses: Vec<FilterClause>,
        log_clauses: Vec<FilterClause>,
        always_emit_header: bool,
    ) -> Result<Self> {
        if call_clauses.is_empty() && log_clauses.is_empty() {
            return Err(Error::InvalidFilter(
                "filter needs at least one call or log clause".to_string(),
            ));
        }
        Ok(Self {
            call_clauses,
            log_clauses,
            always_emit_header,
        })
    }

    /// Validate raw wire clauses: 20-byte addresses, 32-byte event
    /// signatures, 4-byte method signatures.
    pub fn from_request(request: &FilterRequest) -> Result<Self> {
        let log_clauses = request
            .log_filters
            .iter()
            .enumerate()
            .map(|(i, f)| log_clause(i, f))
            .collect::<Result<Vec<_>>>()?;
        let call_clauses = request
            .call_filters
            .iter()
            .enumerate()
            .map(|(i, f)| call_clause(i, f))
            .collect::<Result<Vec<_>>>()?;
        Self::new(call_clauses, log_clauses, request.send_all_block_headers)
    }

    pub fn call_clauses(&self) -> &[FilterClause] {
        &self.call_clauses
    }

    pub fn log_clauses(&self) -> &[FilterClause] {
        &self.log_clauses
    }

    pub fn always_emit_header(&self) -> bool {
        self.always_emit_header
    }

    pub fn matches_log(&self, log: &Log) -> bool {
        let sig = log.event_signature().map(|t| &t[..]);
        self.log_clauses.iter().any(|c| c.matches(&log.address, sig))
    }

    pub fn matches_call(&self, call: &Call) -> bool {
        let sig = call.method_selector();
        self.call_clauses.iter().any(|c| c.matches(&call.address, sig))
    }

    pub fn matches_trace(&self, trace: &TransactionTrace) -> bool {
        (!self.log_clauses.is_empty() && trace.receipt_logs().iter().any(|l| self.matches_log(l)))
            || (!self.call_clauses.is_empty() && trace.calls.iter().any(|c| self.matches_call(c)))
    }

    /// Keep only matching traces. With nothing left, emit the bare header if
    /// `always_emit_header` is set, otherwise `None` so the block is not
    /// delivered.
    pub fn transform(&self, block: Block) -> Option<Block> {
        let total = block.transaction_traces.len();
        let Block {
            hash,
            number,
            size,
            header,
            uncles,
            transaction_traces,
            balance_changes,
            code_changes,
            system_calls,
        } = block;
        let kept: Vec<TransactionTrace> = transaction_traces
            .into_iter()
            .filter(|t| self.matches_trace(t))
            .collect();

        if kept.is_empty() {
            if !self.always_emit_header {
                return None;
            }
            return Some(header_only(Block {
                hash,
                number,
                size,
                header,
                ..Block::default()
            }));
        }

        debug!(target: "index::filter", block = number, kept = kept.len(), total, "filtered block");
        Some(Block {
            hash,
            number,
            size,
            header,
            uncles,
            transaction_traces: kept,
            balance_changes,
            code_changes,
            system_calls,
        })
    }

    /// Whether a segment of `kind` holds keys for every clause of this filter.
    /// Legacy single-origin segments cannot rule out blocks for clauses of the
    /// other origin.
    pub fn indexable_by(&self, kind: IndexKind) -> bool {
        (self.log_clauses.is_empty() || kind.covers(KeyOrigin::Log))
            && (self.call_clauses.is_empty() || kind.covers(KeyOrigin::Call))
    }

    pub fn index_matcher(&self, kind: IndexKind) -> IndexMatcher {
        let calls = self
            .call_clauses
            .iter()
            .map(|c| c.key_clause(kind, KeyOrigin::Call));
        let logs = self
            .log_clauses
            .iter()
            .map(|c| c.key_clause(kind, KeyOrigin::Log));
        IndexMatcher::new(calls.chain(logs).collect())
    }

    /// Provider for skip-scanning, or `None` when the index cannot be used:
    /// no store, no clauses, a kind that doesn't cover the clauses, or
    /// `always_emit_header` (skipped blocks would lose their header).
    pub fn compile_index_provider(
        &self,
        store: Option<Arc<dyn SegmentStore>>,
        config: &Config,
    ) -> Result<Option<SegmentIndexProvider>> {
        let Some(store) = store else {
            return Ok(None);
        };
        if self.call_clauses.is_empty() && self.log_clauses.is_empty() {
            return Ok(None);
        }
        if self.always_emit_header {
            debug!(target: "index::filter", "always_emit_header set, not using index");
            return Ok(None);
        }
        if !self.indexable_by(config.index_kind) {
            debug!(
                target: "index::filter",
                kind = %config.index_kind,
                "index kind does not cover every clause, not using index"
            );
            return Ok(None);
        }
        let matcher = Box::new(self.index_matcher(config.index_kind));
        SegmentIndexProvider::from_config(store, config, matcher).map(Some)
    }
}

impl BlockTransform for CombinedFilter {
    fn name(&self) -> &'static str {
        "combined_filter"
    }

    fn transform(&self, block: Block) -> Option<Block> {
        CombinedFilter::transform(self, block)
    }
}

fn address(raw: &[u8], what: &str) -> Result<Address20> {
    raw.try_into().map_err(|_| {
        Error::InvalidFilter(format!(
            "{what}: address must be {ADDRESS_LEN} bytes, got {}",
            raw.len()
        ))
    })
}

fn signature(raw: &[u8], len: usize, what: &str) -> Result<Vec<u8>> {
    if raw.len() != len {
        return Err(Error::InvalidFilter(format!(
            "{what}: signature must be {len} bytes, got {}",
            raw.len()
        )));
    }
    Ok(raw.to_vec())
}

fn log_clause(i: usize, f: &LogFilterRequest) -> Result<FilterClause> {
    let what = format!("log filter #{i}");
    let addresses = f
        .addresses
        .iter()
        .map(|a| address(a, &what))
        .collect::<Result<Vec<_>>>()?;
    let signatures = f
        .event_signatures
        .iter()
        .map(|s| signature(s, EVENT_SIGNATURE_LEN, &what))
        .collect::<Result<Vec<_>>>()?;
    FilterClause::new(addresses, signatures)
        .map_err(|e| Error::InvalidFilter(format!("{what}: {e}")))
}

fn call_clause(i: usize, f: &CallToFilterRequest) -> Result<FilterClause> {
    let what = format!("call filter #{i}");
    let addresses = f
        .addresses
        .iter()
        .map(|a| address(a, &what))
        .collect::<Result<Vec<_>>>()?;
    let signatures = f
        .signatures
        .iter()
        .map(|s| signature(s, METHOD_SIGNATURE_LEN, &what))
        .collect::<Result<Vec<_>>>()?;
    FilterClause::new(addresses, signatures)
        .map_err(|e| Error::InvalidFilter(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TransactionReceipt;

    const A: Address20 = [0xaa; 20];
    const B: Address20 = [0xbb; 20];
    const T: [u8; 32] = [0x11; 32];
    const T2: [u8; 32] = [0x22; 32];

    fn log(address: Address20, topic0: [u8; 32]) -> Log {
        Log {
            address,
            topics: vec![topic0],
            ..Log::default()
        }
    }

    fn trace_with_logs(hash: u8, logs: Vec<Log>) -> TransactionTrace {
        TransactionTrace {
            hash: [hash; 32],
            receipt: Some(TransactionReceipt {
                logs,
                ..TransactionReceipt::default()
            }),
            ..TransactionTrace::default()
        }
    }

    fn log_filter(addresses: Vec<Address20>, sigs: Vec<[u8; 32]>, emit: bool) -> CombinedFilter {
        let clause =
            FilterClause::new(addresses, sigs.into_iter().map(|s| s.to_vec())).expect("clause");
        CombinedFilter::new(vec![], vec![clause], emit).expect("filter")
    }

    #[test]
    fn log_match_requires_same_log() {
        let trace = trace_with_logs(1, vec![log(A, T), log(B, T2)]);
        assert!(log_filter(vec![A], vec![T], false).matches_trace(&trace));
        // A and T2 both occur, but never on the same log.
        assert!(!log_filter(vec![A], vec![T2], false).matches_trace(&trace));
        assert!(log_filter(vec![], vec![T2], false).matches_trace(&trace));
        assert!(log_filter(vec![B], vec![], false).matches_trace(&trace));
    }

    #[test]
    fn call_match_uses_selector() {
        let trace = TransactionTrace {
            calls: vec![Call {
                address: A,
                input: vec![0xa9, 0x05, 0x9c, 0xbb, 0x00, 0x01],
                ..Call::default()
            }],
            ..TransactionTrace::default()
        };
        let matching = CombinedFilter::new(
            vec![FilterClause::new([A], [vec![0xa9, 0x05, 0x9c, 0xbb]]).expect("clause")],
            vec![],
            false,
        )
        .expect("filter");
        assert!(matching.matches_trace(&trace));

        let other_sig = CombinedFilter::new(
            vec![FilterClause::new([A], [vec![0x23, 0xb8, 0x72, 0xdd]]).expect("clause")],
            vec![],
            false,
        )
        .expect("filter");
        assert!(!other_sig.matches_trace(&trace));
    }

    #[test]
    fn short_input_never_matches_a_signature() {
        let trace = TransactionTrace {
            calls: vec![Call {
                address: A,
                input: vec![0xa9, 0x05],
                ..Call::default()
            }],
            ..TransactionTrace::default()
        };
        let f = CombinedFilter::new(
            vec![FilterClause::new([], [vec![0xa9, 0x05, 0x9c, 0xbb]]).expect("clause")],
            vec![],
            false,
        )
        .expect("filter");
        assert!(!f.matches_trace(&trace));
    }

    #[test]
    fn transform_strips_non_matching_traces() {
        let block = Block {
            number: 9,
            balance_changes: vec![Default::default()],
            transaction_traces: vec![
                trace_with_logs(1, vec![log(B, T2)]),
                trace_with_logs(2, vec![log(A, T)]),
            ],
            ..Block::default()
        };
        let out = log_filter(vec![A], vec![], false)
            .transform(block)
            .expect("match");
        assert_eq!(out.transaction_traces.len(), 1);
        assert_eq!(out.transaction_traces[0].hash, [2; 32]);
        assert_eq!(out.balance_changes.len(), 1);
    }

    #[test]
    fn unmatched_block_is_dropped_or_header_only() {
        let block = Block {
            number: 9,
            hash: [9; 32],
            balance_changes: vec![Default::default()],
            transaction_traces: vec![trace_with_logs(1, vec![log(B, T2)])],
            ..Block::default()
        };
        assert!(log_filter(vec![A], vec![], false).transform(block.clone()).is_none());

        let out = log_filter(vec![A], vec![], true)
            .transform(block)
            .expect("header");
        assert_eq!(out.number, 9);
        assert_eq!(out.hash, [9; 32]);
        assert!(out.transaction_traces.is_empty());
        assert!(out.balance_changes.is_empty());
    }

    #[test]
    fn construction_rejects_empty_filters() {
        assert!(matches!(
            FilterClause::new([], []),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            CombinedFilter::new(vec![], vec![], true),
            Err(Error::InvalidFilter(_))
        ));
    }

    #[test]
    fn request_lengths_are_validated() {
        let bad_addr = FilterRequest {
            log_filters: vec![LogFilterRequest {
                addresses: vec![vec![0xaa; 19]],
                event_signatures: vec![],
            }],
            ..FilterRequest::default()
        };
        assert!(matches!(
            CombinedFilter::from_request(&bad_addr),
            Err(Error::InvalidFilter(_))
        ));

        let event_sig_on_call = FilterRequest {
            call_filters: vec![CallToFilterRequest {
                addresses: vec![],
                signatures: vec![T.to_vec()],
            }],
            ..FilterRequest::default()
        };
        assert!(CombinedFilter::from_request(&event_sig_on_call).is_err());

        let empty_clause = FilterRequest {
            log_filters: vec![LogFilterRequest::default()],
            ..FilterRequest::default()
        };
        assert!(CombinedFilter::from_request(&empty_clause).is_err());

        let ok = FilterRequest {
            log_filters: vec![LogFilterRequest {
                addresses: vec![A.to_vec()],
                event_signatures: vec![T.to_vec()],
            }],
            call_filters: vec![CallToFilterRequest {
                addresses: vec![B.to_vec()],
                signatures: vec![vec![1, 2, 3, 4]],
            }],
            send_all_block_headers: true,
            ..FilterRequest::default()
        };
        let f = CombinedFilter::from_request(&ok).expect("valid");
        assert_eq!(f.log_clauses().len(), 1);
        assert_eq!(f.call_clauses().len(), 1);
        assert!(f.always_emit_header());
    }

    #[test]
    fn provider_only_when_index_is_usable() {
        let store: Arc<dyn SegmentStore> =
            Arc::new(crate::store::memory::InMemorySegmentStore::default());
        let config = Config::default();

        let f = log_filter(vec![A], vec![], false);
        assert!(f.compile_index_provider(None, &config).expect("compile").is_none());
        assert!(
            f.compile_index_provider(Some(Arc::clone(&store)), &config)
                .expect("compile")
                .is_some()
        );

        let emit = log_filter(vec![A], vec![], true);
        assert!(
            emit.compile_index_provider(Some(Arc::clone(&store)), &config)
                .expect("compile")
                .is_none()
        );

        let call_only_kind = Config {
            index_kind: IndexKind::CallAddrSig,
            ..Config::default()
        };
        assert!(
            f.compile_index_provider(Some(store), &call_only_kind)
                .expect("compile")
                .is_none()
        );
    }

    #[test]
    fn index_matcher_tags_by_origin() {
        let f = CombinedFilter::new(
            vec![FilterClause::new([B], []).expect("clause")],
            vec![FilterClause::new([A], [T.to_vec()]).expect("clause")],
            false,
        )
        .expect("filter");
        let m = f.index_matcher(IndexKind::Combined);
        assert_eq!(m.clauses().len(), 2);
        assert_eq!(m.clauses()[0].addresses, vec![format!("call:{}", "bb".repeat(20))]);
        assert_eq!(m.clauses()[1].signatures, vec![format!("log:{}", "11".repeat(32))]);

        let legacy = log_filter(vec![A], vec![], false).index_matcher(IndexKind::LogAddrSig);
        assert_eq!(legacy.clauses()[0].addresses, vec!["aa".repeat(20)]);
    }
}
