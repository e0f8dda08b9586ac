use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::domain::keys::SegmentId;
use crate::error::{Error, Result};
use crate::store::traits::SegmentStore;

#[derive(Default)]
pub struct InMemorySegmentStore {
    inner: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemorySegmentStore {
    /// Published object names in lexical order.
    pub fn object_names(&self) -> Result<Vec<String>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))?;
        Ok(guard.keys().cloned().collect())
    }
}

#[async_trait::async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn exists(&self, id: &SegmentId) -> Result<bool> {
        let guard = self
            .inner
            .read()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))?;
        Ok(guard.contains_key(&id.object_name()))
    }

    async fn write(&self, id: &SegmentId, value: Bytes) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))?;
        guard.insert(id.object_name(), value);
        Ok(())
    }

    async fn open(&self, id: &SegmentId) -> Result<Bytes> {
        let guard = self
            .inner
            .read()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))?;
        guard.get(&id.object_name()).cloned().ok_or(Error::NotFound)
    }
}
