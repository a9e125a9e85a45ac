//! In-process [`StorageAgent`] for local runs and tests.
//!
//! Issues sequential file ids starting at 1 and uses the SHA-256 hex digest
//! of the content as its hash. Nothing survives a restart.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{DeletedFile, FileContent, StorageAgent, StoredFile};
use crate::models::FileId;

#[derive(Default)]
struct Files {
    next_id: u64,
    namespace: Option<String>,
    files: BTreeMap<u64, String>,
}

#[derive(Default)]
pub struct MemoryAgent {
    inner: Mutex<Files>,
}

impl MemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn namespace(&self) -> Option<String> {
        self.inner.lock().await.namespace.clone()
    }
}

pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[async_trait]
impl StorageAgent for MemoryAgent {
    fn name(&self) -> &str {
        "memory"
    }

    async fn setup(&self, namespace: &str) -> Result<()> {
        self.inner.lock().await.namespace = Some(namespace.to_string());
        Ok(())
    }

    async fn create(&self, content: &str) -> Result<StoredFile> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.files.insert(id, content.to_string());
        Ok(StoredFile {
            file_id: FileId(id),
            content_hash: content_hash(content),
        })
    }

    async fn get_file(&self, file_id: FileId) -> Result<Option<FileContent>> {
        let inner = self.inner.lock().await;
        Ok(inner.files.get(&file_id.0).map(|content| FileContent {
            content: content.clone(),
            content_hash: content_hash(content),
        }))
    }

    async fn update(&self, file_id: FileId, content: &str) -> Result<StoredFile> {
        let mut inner = self.inner.lock().await;
        match inner.files.get_mut(&file_id.0) {
            Some(existing) => {
                *existing = content.to_string();
                Ok(StoredFile {
                    file_id,
                    content_hash: content_hash(content),
                })
            }
            None => bail!("file {} not found", file_id),
        }
    }

    async fn delete(&self, file_id: FileId) -> Result<Option<DeletedFile>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.files.remove(&file_id.0).map(|content| DeletedFile {
            file_id,
            hash: content_hash(&content),
        }))
    }
}
