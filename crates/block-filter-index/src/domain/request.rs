use serde::{Deserialize, Serialize};

/// Log clause as received on the wire: raw 20-byte addresses and 32-byte
/// event signatures (topic 0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilterRequest {
    pub addresses: Vec<Vec<u8>>,
    pub event_signatures: Vec<Vec<u8>>,
}

/// Call clause as received on the wire: raw 20-byte callee addresses and
/// 4-byte method selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToFilterRequest {
    pub addresses: Vec<Vec<u8>>,
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub log_filters: Vec<LogFilterRequest>,
    pub call_filters: Vec<CallToFilterRequest>,
    /// Emit a header-only block instead of dropping a block with no match.
    pub send_all_block_headers: bool,
    pub header_only: bool,
    pub call_only: bool,
}

impl FilterRequest {
    pub fn has_clauses(&self) -> bool {
        !self.log_filters.is_empty() || !self.call_filters.is_empty()
    }
}
