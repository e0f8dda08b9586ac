use bytes::Bytes;

use crate::domain::keys::SegmentId;
use crate::error::Result;

/// Object store holding published segments under `SegmentId::object_name()`.
///
/// `write` must be atomic-or-absent: a reader either sees the complete
/// payload or no object at all.
#[async_trait::async_trait]
pub trait SegmentStore: Send + Sync {
    async fn exists(&self, id: &SegmentId) -> Result<bool>;
    async fn write(&self, id: &SegmentId, value: Bytes) -> Result<()>;
    /// Fails with `Error::NotFound` when the segment was never written.
    async fn open(&self, id: &SegmentId) -> Result<Bytes>;
}
