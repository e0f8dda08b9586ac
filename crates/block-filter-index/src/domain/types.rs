//! Decoded block model consumed by the index and filters.
//!
//! Blocks arrive already validated by the block source. In particular:
//! - `TransactionTrace::calls` is in pre-order (a parent precedes its children),
//! - `state_reverted` on every call is already resolved,
//! - receipt logs are populated and carry their ordinals.
//!
//! Nothing in this crate re-derives those properties.

use serde::{Deserialize, Serialize};

pub type Hash32 = [u8; 32];
pub type Address20 = [u8; 20];
pub type Topic32 = [u8; 32];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: Hash32,
    pub uncle_hash: Hash32,
    pub coinbase: Address20,
    pub state_root: Hash32,
    pub transactions_root: Hash32,
    pub receipt_root: Hash32,
    pub logs_bloom: Vec<u8>,
    pub difficulty: Vec<u8>,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    pub mix_hash: Hash32,
    pub nonce: u64,
    pub hash: Hash32,
    pub base_fee_per_gas: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub hash: Hash32,
    pub number: u64,
    pub size: u64,
    pub header: BlockHeader,
    pub uncles: Vec<BlockHeader>,
    pub transaction_traces: Vec<TransactionTrace>,
    pub balance_changes: Vec<BalanceChange>,
    pub code_changes: Vec<CodeChange>,
    pub system_calls: Vec<Call>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionStatus {
    #[default]
    Unknown,
    Succeeded,
    Failed,
    Reverted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTuple {
    pub address: Address20,
    pub storage_keys: Vec<Hash32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionTrace {
    pub to: Address20,
    pub nonce: u64,
    pub gas_price: Vec<u8>,
    pub gas_limit: u64,
    pub value: Vec<u8>,
    pub input: Vec<u8>,
    pub v: Vec<u8>,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    pub gas_used: u64,
    pub tx_type: u32,
    pub access_list: Vec<AccessTuple>,
    pub max_fee_per_gas: Option<Vec<u8>>,
    pub max_priority_fee_per_gas: Option<Vec<u8>>,
    pub index: u32,
    pub hash: Hash32,
    pub from: Address20,
    pub return_data: Vec<u8>,
    pub public_key: Vec<u8>,
    pub begin_ordinal: u64,
    pub end_ordinal: u64,
    pub status: TransactionStatus,
    pub receipt: Option<TransactionReceipt>,
    pub calls: Vec<Call>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub state_root: Vec<u8>,
    pub cumulative_gas_used: u64,
    pub logs_bloom: Vec<u8>,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Log {
    pub address: Address20,
    pub topics: Vec<Topic32>,
    pub data: Vec<u8>,
    pub index: u32,
    pub block_index: u32,
    pub ordinal: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallType {
    #[default]
    Unspecified,
    Call,
    Callcode,
    Delegate,
    Static,
    Create,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageChange {
    pub address: Address20,
    pub key: Hash32,
    pub old_value: Hash32,
    pub new_value: Hash32,
    pub ordinal: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceChange {
    pub address: Address20,
    pub old_value: Vec<u8>,
    pub new_value: Vec<u8>,
    pub ordinal: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NonceChange {
    pub address: Address20,
    pub old_value: u64,
    pub new_value: u64,
    pub ordinal: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeChange {
    pub address: Address20,
    pub old_hash: Hash32,
    pub old_code: Vec<u8>,
    pub new_hash: Hash32,
    pub new_code: Vec<u8>,
    pub ordinal: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GasChange {
    pub old_value: u64,
    pub new_value: u64,
    pub reason: u32,
    pub ordinal: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Call {
    pub index: u32,
    pub parent_index: u32,
    pub depth: u32,
    pub call_type: CallType,
    pub caller: Address20,
    pub address: Address20,
    pub value: Option<Vec<u8>>,
    pub gas_limit: u64,
    pub gas_consumed: u64,
    pub return_data: Vec<u8>,
    pub input: Vec<u8>,
    pub executed_code: bool,
    pub suicide: bool,
    pub keccak_preimages: Vec<(Hash32, Vec<u8>)>,
    pub storage_changes: Vec<StorageChange>,
    pub balance_changes: Vec<BalanceChange>,
    pub nonce_changes: Vec<NonceChange>,
    pub logs: Vec<Log>,
    pub code_changes: Vec<CodeChange>,
    pub gas_changes: Vec<GasChange>,
    pub status_failed: bool,
    pub status_reverted: bool,
    pub failure_reason: String,
    pub state_reverted: bool,
    pub begin_ordinal: u64,
    pub end_ordinal: u64,
}

impl Call {
    /// First four bytes of the input, when the call carries a method selector.
    pub fn method_selector(&self) -> Option<&[u8]> {
        self.input.get(..4)
    }
}

impl Log {
    pub fn event_signature(&self) -> Option<&Topic32> {
        self.topics.first()
    }
}

impl TransactionTrace {
    pub fn receipt_logs(&self) -> &[Log] {
        self.receipt.as_ref().map_or(&[], |r| r.logs.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_requires_four_bytes() {
        let short = Call {
            input: vec![1, 2, 3],
            ..Call::default()
        };
        assert_eq!(short.method_selector(), None);

        let call = Call {
            input: vec![0xa9, 0x05, 0x9c, 0xbb, 0xff],
            ..Call::default()
        };
        assert_eq!(call.method_selector(), Some(&[0xa9, 0x05, 0x9c, 0xbb][..]));
    }

    #[test]
    fn trace_without_receipt_has_no_logs() {
        assert!(TransactionTrace::default().receipt_logs().is_empty());
    }
}
