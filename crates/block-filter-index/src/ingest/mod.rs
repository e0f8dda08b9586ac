pub mod extractor;
pub mod indexer;

pub use extractor::KeyExtractor;
pub use indexer::SegmentIndexer;
