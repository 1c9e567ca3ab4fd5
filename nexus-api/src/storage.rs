//! Document file storage under `<root>/documents/<id>`

use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiResult;

#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
    max_upload_bytes: usize,
}

impl DocumentStore {
    pub fn new(dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            dir,
            max_upload_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Write the bytes and return their lowercase hex SHA-256
    pub async fn write(&self, id: Uuid, bytes: &[u8]) -> ApiResult<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(id), bytes).await?;
        debug!("Stored document {} ({} bytes)", id, bytes.len());
        Ok(sha256_hex(bytes))
    }

    pub async fn read(&self, id: Uuid) -> ApiResult<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(id)).await?)
    }

    /// Remove the file; a file that is already gone is not an error
    pub async fn remove(&self, id: Uuid) -> ApiResult<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Document file {} was already missing", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::new(temp_dir.path().join("documents"), 1024);
        let id = Uuid::new_v4();

        let hash = store.write(id, b"floor plan").await.unwrap();
        assert_eq!(hash, sha256_hex(b"floor plan"));
        assert_eq!(store.read(id).await.unwrap(), b"floor plan");

        store.remove(id).await.unwrap();
        assert!(store.read(id).await.is_err());
        // removing twice is fine
        store.remove(id).await.unwrap();
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
