pub mod keys;
pub mod request;
pub mod types;
