//! Guide ingestion service.
//!
//! [`GuideLibrary`] ties the storage agent to the in-memory
//! [`GuideStore`]. Every write (upload, delete, recovery) is serialised
//! behind one mutex so the store and the optional persisted index file
//! never disagree about which guides exist.
//!
//! # Recovery
//!
//! The store starts empty on every restart. [`GuideLibrary::ensure_recovered`]
//! rebuilds it once, either from the guide index file
//! (`library.index_file_id`) or, without one, by probing the file ids in
//! `[probe_start, probe_end)` and skipping ids that fail to resolve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::LibraryConfig;
use crate::markdown::split_guide;
use crate::models::{FileId, Guide, GuideIndex, GuideRecord};
use crate::storage::{FileContent, StorageAgent};
use crate::store::GuideStore;

/// Creator recorded for guides recovered without an index.
pub const UNKNOWN_CREATOR: &str = "unknown";

/// Result of a delete request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    /// Whether a guide or a stored file was removed.
    pub removed: bool,
    pub hash: Option<String>,
}

pub struct GuideLibrary {
    store: Arc<GuideStore>,
    storage: Arc<dyn StorageAgent>,
    config: LibraryConfig,
    writes: Mutex<()>,
    recovered: AtomicBool,
}

impl GuideLibrary {
    pub fn new(store: Arc<GuideStore>, storage: Arc<dyn StorageAgent>, config: LibraryConfig) -> Self {
        Self {
            store,
            storage,
            config,
            writes: Mutex::new(()),
            recovered: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &GuideStore {
        &self.store
    }

    pub fn storage(&self) -> &dyn StorageAgent {
        self.storage.as_ref()
    }

    /// True when `file_id` is the guide index file rather than a guide.
    pub fn is_index(&self, file_id: FileId) -> bool {
        self.config.index_file_id == Some(file_id.0)
    }

    /// Persist a guide and record it in the store.
    ///
    /// The submitted markdown is stored as is; title and content are derived from
    /// what the agent reports back (falling back to the submitted text).
    pub async fn upload(&self, markdown: &str, creator: &str) -> Result<Guide> {
        let _guard = self.writes.lock().await;

        let stored = self
            .storage
            .create(markdown)
            .await
            .context("Failed to store guide")?;

        let persisted = match self.storage.get_file(stored.file_id).await {
            Ok(Some(file)) => file.content,
            Ok(None) => markdown.to_string(),
            Err(e) => {
                tracing::warn!(file_id = %stored.file_id, error = %e, "read-back failed, using submitted content");
                markdown.to_string()
            }
        };

        let guide = build_guide(
            stored.file_id,
            &persisted,
            stored.content_hash,
            creator.to_string(),
            Utc::now(),
        );

        self.store.add(guide.clone()).await;
        self.persist_index(None).await;

        tracing::info!(file_id = %guide.file_id, title = %guide.title, creator = %guide.creator, "guide added");
        Ok(guide)
    }

    /// Delete a guide from the storage agent and the store.
    pub async fn delete(&self, file_id: FileId) -> Result<DeleteOutcome> {
        let _guard = self.writes.lock().await;

        let deleted = self
            .storage
            .delete(file_id)
            .await
            .with_context(|| format!("Failed to delete file {}", file_id))?;
        let removed_local = self.store.remove(file_id).await;

        if removed_local || deleted.is_some() {
            self.persist_index(Some(file_id)).await;
        }

        let outcome = DeleteOutcome {
            removed: deleted.is_some() || removed_local,
            hash: deleted.map(|d| d.hash),
        };
        tracing::info!(%file_id, removed = outcome.removed, "guide delete");
        Ok(outcome)
    }

    /// Guides in upload order, optionally for one wallet.
    ///
    /// Triggers recovery on first use; a failed recovery is logged and the
    /// current store contents are returned.
    pub async fn list(&self, wallet: Option<&str>) -> Vec<Guide> {
        if let Err(e) = self.ensure_recovered().await {
            tracing::warn!(error = %e, "guide recovery failed");
        }
        self.store.list(wallet).await
    }

    /// Rebuild the store from the storage agent, once per process.
    ///
    /// Returns the number of guides added. Guides already in the store are
    /// left untouched. A failed attempt is retried on the next call.
    pub async fn ensure_recovered(&self) -> Result<usize> {
        if !self.config.recover || self.recovered.load(Ordering::Acquire) {
            return Ok(0);
        }

        let _guard = self.writes.lock().await;
        if self.recovered.load(Ordering::Acquire) {
            return Ok(0);
        }

        let guides = match self.config.index_file_id {
            Some(index_id) => self.recover_from_index(FileId(index_id)).await?,
            None => self.recover_by_probing().await,
        };

        let added = self.store.restore(guides).await;

        self.recovered.store(true, Ordering::Release);
        tracing::info!(added, "recovered guides from storage agent");
        Ok(added)
    }

    async fn recover_from_index(&self, index_id: FileId) -> Result<Vec<Guide>> {
        let Some(index) = self.read_index(index_id).await? else {
            tracing::warn!(%index_id, "guide index file not found");
            return Ok(Vec::new());
        };

        let mut guides = Vec::with_capacity(index.guides.len());
        for record in index.guides {
            match self.storage.get_file(record.file_id).await {
                Ok(Some(file)) => guides.push(guide_from_file(
                    record.file_id,
                    file,
                    record.creator,
                    record.timestamp,
                )),
                Ok(None) => tracing::warn!(file_id = %record.file_id, "indexed guide missing"),
                Err(e) => {
                    tracing::warn!(file_id = %record.file_id, error = %e, "indexed guide unreadable")
                }
            }
        }
        Ok(guides)
    }

    async fn recover_by_probing(&self) -> Vec<Guide> {
        let now = Utc::now();
        self.probe()
            .await
            .into_iter()
            .map(|(file_id, file)| guide_from_file(file_id, file, UNKNOWN_CREATOR.to_string(), now))
            .collect()
    }

    /// Resolve every id in the probe range, skipping absent ids, failures
    /// and index documents.
    pub async fn probe(&self) -> Vec<(FileId, FileContent)> {
        let mut found = Vec::new();
        for id in self.config.probe_start..self.config.probe_end {
            let file_id = FileId(id);
            if self.is_index(file_id) {
                continue;
            }
            match self.storage.get_file(file_id).await {
                Ok(Some(file)) if !is_index_document(&file.content) => found.push((file_id, file)),
                Ok(_) => {}
                Err(e) => tracing::debug!(%file_id, error = %e, "probe skipped"),
            }
        }
        found
    }

    /// Read and parse the guide index file. `None` if the file is absent.
    pub async fn read_index(&self, index_id: FileId) -> Result<Option<GuideIndex>> {
        let Some(file) = self.storage.get_file(index_id).await? else {
            return Ok(None);
        };
        let index: GuideIndex = serde_json::from_str(&file.content)
            .with_context(|| format!("Invalid guide index in file {}", index_id))?;
        Ok(Some(index))
    }

    /// Store a new guide index file and return its id.
    pub async fn create_index(&self, records: Vec<GuideRecord>) -> Result<FileId> {
        let body = serde_json::to_string_pretty(&GuideIndex { guides: records })?;
        let stored = self.storage.create(&body).await?;
        Ok(stored.file_id)
    }

    /// Rewrite the index file: the records already persisted, minus
    /// `removed`, updated with what the store holds. Records the store has
    /// not recovered (yet) are kept. An unreadable index is left untouched.
    /// Failures are logged; the store stays authoritative for this process.
    async fn persist_index(&self, removed: Option<FileId>) {
        let Some(index_id) = self.config.index_file_id.map(FileId) else {
            return;
        };

        let persisted = match self.read_index(index_id).await {
            Ok(index) => index.map(|i| i.guides).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(%index_id, error = %e, "guide index unreadable, not rewriting it");
                return;
            }
        };

        let current: Vec<GuideRecord> = self
            .store
            .list(None)
            .await
            .iter()
            .map(GuideRecord::from)
            .collect();
        let records = merge_records(persisted, current, removed);

        let result = match serde_json::to_string_pretty(&GuideIndex { guides: records }) {
            Ok(body) => self.storage.update(index_id, &body).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            tracing::warn!(%index_id, error = %e, "failed to update guide index");
        }
    }
}

/// Persisted records keep their position; records for guides new to the
/// index are appended in store order.
fn merge_records(
    persisted: Vec<GuideRecord>,
    current: Vec<GuideRecord>,
    removed: Option<FileId>,
) -> Vec<GuideRecord> {
    let mut merged: Vec<GuideRecord> = persisted
        .into_iter()
        .filter(|r| Some(r.file_id) != removed)
        .collect();
    for record in current {
        match merged.iter_mut().find(|r| r.file_id == record.file_id) {
            Some(slot) => *slot = record,
            None => merged.push(record),
        }
    }
    merged
}

fn build_guide(
    file_id: FileId,
    markdown: &str,
    content_hash: String,
    creator: String,
    timestamp: DateTime<Utc>,
) -> Guide {
    let (title, content) = split_guide(markdown);
    Guide {
        file_id,
        title,
        content,
        content_hash,
        creator,
        timestamp,
    }
}

fn guide_from_file(
    file_id: FileId,
    file: FileContent,
    creator: String,
    timestamp: DateTime<Utc>,
) -> Guide {
    build_guide(file_id, &file.content, file.content_hash, creator, timestamp)
}

/// An index file is a JSON object with a `guides` array.
fn is_index_document(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| v.get("guides").map(|g| g.is_array()))
        .unwrap_or(false)
}
