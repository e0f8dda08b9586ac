pub mod segment;

pub use segment::{decode_segment, encode_segment};
