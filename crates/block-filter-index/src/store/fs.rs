use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::domain::keys::SegmentId;
use crate::error::{Error, Result};
use crate::store::traits::SegmentStore;

/// Segments as flat files under one directory, named `{low:010}.{size}.{kind}.idx`.
#[derive(Debug, Clone)]
pub struct FsSegmentStore {
    root: PathBuf,
}

impl FsSegmentStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| Error::Backend(format!("create fs segment dir: {e}")))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn segment_path(&self, id: &SegmentId) -> PathBuf {
        self.root.join(id.object_name())
    }

    fn staging_path(&self, id: &SegmentId) -> PathBuf {
        self.root.join(format!(".{}.partial", id.object_name()))
    }
}

#[async_trait::async_trait]
impl SegmentStore for FsSegmentStore {
    async fn exists(&self, id: &SegmentId) -> Result<bool> {
        match fs::metadata(self.segment_path(id)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Backend(format!("fs segment stat: {e}"))),
        }
    }

    async fn write(&self, id: &SegmentId, value: Bytes) -> Result<()> {
        // Stage under a hidden name, then rename into place so readers never
        // observe a partial segment.
        let staging = self.staging_path(id);
        fs::write(&staging, &value).map_err(|e| Error::Backend(format!("fs segment write: {e}")))?;
        if let Err(e) = fs::rename(&staging, self.segment_path(id)) {
            let _ = fs::remove_file(&staging);
            return Err(Error::Backend(format!("fs segment publish: {e}")));
        }
        Ok(())
    }

    async fn open(&self, id: &SegmentId) -> Result<Bytes> {
        match fs::read(self.segment_path(id)) {
            Ok(b) => Ok(Bytes::from(b)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound),
            Err(e) => Err(Error::Backend(format!("fs segment read: {e}"))),
        }
    }
}
