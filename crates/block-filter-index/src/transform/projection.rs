use crate::domain::types::{Block, Call, TransactionTrace};

/// Keep hash, number, size and header. Every trace and state-change
/// collection is emptied.
pub fn header_only(block: Block) -> Block {
    Block {
        hash: block.hash,
        number: block.number,
        size: block.size,
        header: block.header,
        ..Block::default()
    }
}

/// Reduce every trace to what call-graph consumers read: hash, receipt,
/// sender, recipient and a trimmed call tree.
pub fn call_only(block: Block) -> Block {
    Block {
        hash: block.hash,
        number: block.number,
        size: block.size,
        header: block.header,
        transaction_traces: block.transaction_traces.into_iter().map(reduce_trace).collect(),
        ..Block::default()
    }
}

fn reduce_trace(trace: TransactionTrace) -> TransactionTrace {
    TransactionTrace {
        hash: trace.hash,
        receipt: trace.receipt,
        from: trace.from,
        to: trace.to,
        calls: trace.calls.into_iter().map(reduce_call).collect(),
        ..TransactionTrace::default()
    }
}

fn reduce_call(call: Call) -> Call {
    Call {
        index: call.index,
        parent_index: call.parent_index,
        depth: call.depth,
        call_type: call.call_type,
        caller: call.caller,
        address: call.address,
        value: call.value,
        gas_limit: call.gas_limit,
        gas_consumed: call.gas_consumed,
        return_data: call.return_data,
        input: call.input,
        logs: call.logs,
        ..Call::default()
    }
}
