use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::common::AnyResult;

/// Keyed blob store collaborator (§6): `put`/`get`/`delete`/`open_db`. This
/// implementation backs the interface with a local directory of files, one
/// file per key, since the host process here is native rather than a
/// browser extension — the put/get/delete/open_db contract is unchanged.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> AnyResult<()>;
    async fn get(&self, key: &str) -> AnyResult<Bytes>;
    async fn delete(&self, key: &str) -> AnyResult<()>;
    async fn list_keys(&self, prefix: &str) -> AnyResult<Vec<String>>;
}

pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Opens (creating if absent) the directory backing this blob store.
    pub async fn open_db(name: &str) -> AnyResult<Self> {
        let dir = std::env::temp_dir().join("hlsfetch-blobstore").join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> AnyResult<()> {
        let path = self.path_for(key);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AnyResult<Bytes> {
        let bytes = tokio::fs::read(self.path_for(key)).await?;
        Ok(Bytes::from(bytes))
    }

    async fn delete(&self, key: &str) -> AnyResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> AnyResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
