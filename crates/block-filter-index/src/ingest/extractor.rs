use std::collections::BTreeSet;

use crate::domain::keys::{IndexKind, KeyMode, KeyOrigin, index_key};
use crate::domain::types::{Block, TransactionTrace};

/// Derives index keys from a decoded block.
///
/// Logs contribute their address and topic 0; calls contribute their address
/// and 4-byte method selector. Which origins are read, and whether keys are
/// tagged with their origin, depends on the index kind being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyExtractor {
    mode: KeyMode,
    logs: bool,
    calls: bool,
}

impl KeyExtractor {
    pub fn new(mode: KeyMode, logs: bool, calls: bool) -> Self {
        Self { mode, logs, calls }
    }

    pub fn for_kind(kind: IndexKind) -> Self {
        Self {
            mode: kind.key_mode(),
            logs: kind.covers(KeyOrigin::Log),
            calls: kind.covers(KeyOrigin::Call),
        }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn extract(&self, block: &Block) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for trace in &block.transaction_traces {
            self.extract_trace(trace, &mut keys);
        }
        keys
    }

    pub fn extract_trace(&self, trace: &TransactionTrace, keys: &mut BTreeSet<String>) {
        if self.logs {
            for log in trace.receipt_logs() {
                keys.insert(index_key(self.mode, KeyOrigin::Log, &log.address));
                if let Some(sig) = log.event_signature() {
                    keys.insert(index_key(self.mode, KeyOrigin::Log, sig));
                }
            }
        }
        if self.calls {
            for call in &trace.calls {
                keys.insert(index_key(self.mode, KeyOrigin::Call, &call.address));
                if let Some(selector) = call.method_selector() {
                    keys.insert(index_key(self.mode, KeyOrigin::Call, selector));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Call, Log, TransactionReceipt};

    fn block() -> Block {
        Block {
            number: 7,
            transaction_traces: vec![TransactionTrace {
                receipt: Some(TransactionReceipt {
                    logs: vec![
                        Log {
                            address: [0xaa; 20],
                            topics: vec![[0x11; 32], [0x22; 32]],
                            ..Log::default()
                        },
                        Log {
                            address: [0xaa; 20],
                            topics: vec![],
                            ..Log::default()
                        },
                    ],
                    ..TransactionReceipt::default()
                }),
                calls: vec![
                    Call {
                        address: [0xcc; 20],
                        input: vec![0xa9, 0x05, 0x9c, 0xbb, 0x00],
                        ..Call::default()
                    },
                    Call {
                        index: 1,
                        address: [0xdd; 20],
                        input: vec![0x01],
                        ..Call::default()
                    },
                ],
                ..TransactionTrace::default()
            }],
            ..Block::default()
        }
    }

    #[test]
    fn combined_keys_are_tagged() {
        let keys = KeyExtractor::for_kind(IndexKind::Combined).extract(&block());
        let expected: BTreeSet<String> = [
            format!("log:{}", "aa".repeat(20)),
            format!("log:{}", "11".repeat(32)),
            format!("call:{}", "cc".repeat(20)),
            "call:a9059cbb".to_string(),
            format!("call:{}", "dd".repeat(20)),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn legacy_log_kind_is_untagged_and_ignores_calls() {
        let keys = KeyExtractor::for_kind(IndexKind::LogAddrSig).extract(&block());
        let expected: BTreeSet<String> = ["aa".repeat(20), "11".repeat(32)].into_iter().collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn legacy_call_kind_ignores_logs() {
        let keys = KeyExtractor::for_kind(IndexKind::CallAddrSig).extract(&block());
        assert!(keys.contains("a9059cbb"));
        assert!(keys.contains(&"cc".repeat(20)));
        assert!(!keys.contains(&"aa".repeat(20)));
    }

    #[test]
    fn extraction_leaves_block_untouched() {
        let b = block();
        let before = b.clone();
        let _ = KeyExtractor::new(KeyMode::Tagged, true, true).extract(&b);
        assert_eq!(b, before);
    }
}
