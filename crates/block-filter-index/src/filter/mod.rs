pub mod combined;

pub use combined::{CombinedFilter, FilterClause};
