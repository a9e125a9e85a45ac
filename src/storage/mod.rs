//! Storage agent abstraction.
//!
//! The storage agent is the external, content-addressed persistence layer
//! guides are written to. The [`StorageAgent`] trait covers the operations
//! the ingestion pipeline needs:
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`setup`](StorageAgent::setup) | Select / create the namespace files live in |
//! | [`create`](StorageAgent::create) | Store new content, returning its `fileId` and digest |
//! | [`get_file`](StorageAgent::get_file) | Resolve a `fileId` to its content |
//! | [`update`](StorageAgent::update) | Replace the content of an existing file |
//! | [`delete`](StorageAgent::delete) | Delete a file |
//!
//! Implementations:
//! - **[`MemoryAgent`]** keeps files in process; used for local runs and tests.
//! - **[`HttpAgent`]** talks JSON to a storage-agent gateway and resolves
//!   content hashes through an IPFS gateway.
//!
//! Use [`create_agent`] to build the one selected by `[storage].provider`.

pub mod http;
pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{env_secret, StorageConfig};
use crate::models::FileId;

pub use http::HttpAgent;
pub use memory::MemoryAgent;

/// Result of storing new content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub file_id: FileId,
    pub content_hash: String,
}

/// A resolved file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub content: String,
    pub content_hash: String,
}

/// Receipt for a deleted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFile {
    pub file_id: FileId,
    pub hash: String,
}

#[async_trait]
pub trait StorageAgent: Send + Sync {
    /// Short identifier for logs (e.g. `"memory"`, `"http"`).
    fn name(&self) -> &str;

    /// Select the namespace subsequent operations act on.
    async fn setup(&self, namespace: &str) -> Result<()>;

    async fn create(&self, content: &str) -> Result<StoredFile>;

    /// Returns `None` when no file exists under `file_id`.
    async fn get_file(&self, file_id: FileId) -> Result<Option<FileContent>>;

    async fn update(&self, file_id: FileId, content: &str) -> Result<StoredFile>;

    /// Returns `None` when no file existed under `file_id`.
    async fn delete(&self, file_id: FileId) -> Result<Option<DeletedFile>>;
}

/// Build the storage agent selected by configuration.
///
/// | Config Value | Agent |
/// |-------------|-------|
/// | `"memory"` | [`MemoryAgent`] |
/// | `"http"` | [`HttpAgent`] (token from `STORAGE_AGENT_TOKEN`, IPFS bearer from `PINATA_JWT`) |
pub fn create_agent(config: &StorageConfig) -> Result<Box<dyn StorageAgent>> {
    match config.provider.as_str() {
        "memory" => Ok(Box::new(MemoryAgent::new())),
        "http" => Ok(Box::new(HttpAgent::new(
            config,
            env_secret("STORAGE_AGENT_TOKEN"),
            env_secret("PINATA_JWT"),
        )?)),
        other => bail!("Unknown storage provider: {}", other),
    }
}
