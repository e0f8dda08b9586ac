pub mod api;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod segment;
pub mod store;
pub mod transform;

pub use api::BlockFilterIndex;
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{CombinedFilter, FilterClause};
pub use ingest::{KeyExtractor, SegmentIndexer};
pub use query::{FilteredStream, SegmentIndexProvider};
pub use segment::BitmapSegment;
