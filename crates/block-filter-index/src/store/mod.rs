pub mod cache;
pub mod fs;
pub mod memory;
pub mod traits;

#[cfg(feature = "distributed-stores")]
pub mod s3;

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run a store operation under an optional deadline. Dropping the inner
/// future on expiry cancels it; stores publish atomically, so a cancelled
/// write leaves nothing visible.
pub(crate) async fn bounded<T, F>(op: &'static str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout { op, after }),
        },
    }
}
