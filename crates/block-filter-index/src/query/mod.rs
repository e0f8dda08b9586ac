pub mod matcher;
pub mod provider;
pub mod stream;

pub use matcher::{IndexMatcher, KeyClause, SegmentMatcher};
pub use provider::SegmentIndexProvider;
pub use stream::{BlockSource, FilteredStream, InMemoryBlockSource, StreamStats};
