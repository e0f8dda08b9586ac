pub mod counters;

pub use counters::{CounterSnapshot, IndexCounters};
