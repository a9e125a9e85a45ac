//! Process-lifetime guide store.
//!
//! Holds guides in upload order behind a `tokio::sync::RwLock`, so
//! concurrent uploads append atomically. Contents are lost on restart and
//! rebuilt by [`GuideLibrary::ensure_recovered`](crate::library::GuideLibrary::ensure_recovered).

use tokio::sync::RwLock;

use crate::models::{FileId, Guide};

#[derive(Default)]
pub struct GuideStore {
    guides: RwLock<Vec<Guide>>,
}

impl GuideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a guide. An existing entry with the same `fileId` is replaced
    /// in place, so re-recording a file never duplicates it.
    pub async fn add(&self, guide: Guide) {
        let mut guides = self.guides.write().await;
        match guides.iter_mut().find(|g| g.file_id == guide.file_id) {
            Some(existing) => *existing = guide,
            None => guides.push(guide),
        }
    }

    /// Put recovered guides ahead of everything uploaded by this process,
    /// keeping their order. Guides whose `fileId` is already held are
    /// skipped. Returns how many were restored.
    pub async fn restore(&self, recovered: Vec<Guide>) -> usize {
        let mut guides = self.guides.write().await;
        let mut restored: Vec<Guide> = Vec::with_capacity(recovered.len() + guides.len());
        for guide in recovered {
            let held = guides.iter().chain(restored.iter()).any(|g| g.file_id == guide.file_id);
            if !held {
                restored.push(guide);
            }
        }
        let count = restored.len();
        restored.append(&mut *guides);
        *guides = restored;
        count
    }

    /// All guides in insertion order, optionally restricted to one creator.
    /// Wallet addresses compare case-insensitively.
    pub async fn list(&self, wallet: Option<&str>) -> Vec<Guide> {
        let guides = self.guides.read().await;
        match wallet.map(str::trim).filter(|w| !w.is_empty()) {
            Some(wallet) => guides
                .iter()
                .filter(|g| g.creator.eq_ignore_ascii_case(wallet))
                .cloned()
                .collect(),
            None => guides.clone(),
        }
    }

    pub async fn get(&self, file_id: FileId) -> Option<Guide> {
        let guides = self.guides.read().await;
        guides.iter().find(|g| g.file_id == file_id).cloned()
    }

    /// Remove the guide with this id. Returns whether one was removed.
    pub async fn remove(&self, file_id: FileId) -> bool {
        let mut guides = self.guides.write().await;
        match guides.iter().position(|g| g.file_id == file_id) {
            Some(pos) => {
                guides.remove(pos);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.guides.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.guides.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn guide(id: u64, creator: &str) -> Guide {
        Guide {
            file_id: FileId(id),
            title: format!("Guide {}", id),
            content: "content".to_string(),
            content_hash: format!("hash{}", id),
            creator: creator.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_preserves_upload_order() {
        let store = GuideStore::new();
        for id in [3, 1, 2] {
            store.add(guide(id, "0xabc")).await;
        }
        let ids: Vec<u64> = store.list(None).await.iter().map(|g| g.file_id.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_filter_by_wallet_case_insensitive() {
        let store = GuideStore::new();
        store.add(guide(1, "0xABC")).await;
        store.add(guide(2, "0xdef")).await;

        let mine = store.list(Some("0xabc")).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].file_id, FileId(1));
        assert_eq!(store.list(Some("  ")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_exactly_one() {
        let store = GuideStore::new();
        store.add(guide(1, "a")).await;
        store.add(guide(2, "a")).await;

        assert!(store.remove(FileId(1)).await);
        assert_eq!(store.len().await, 1);
        assert!(!store.remove(FileId(99)).await);
        assert_eq!(store.len().await, 1);
        assert!(store.get(FileId(2)).await.is_some());
    }

    #[tokio::test]
    async fn test_re_adding_same_id_replaces() {
        let store = GuideStore::new();
        store.add(guide(1, "a")).await;
        let mut updated = guide(1, "a");
        updated.title = "Renamed".to_string();
        store.add(updated).await;

        let all = store.list(None).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Renamed");
    }

    #[tokio::test]
    async fn test_restore_keeps_existing_and_goes_first() {
        let store = GuideStore::new();
        store.add(guide(3, "0xowner")).await;

        let restored = store
            .restore(vec![guide(1, "unknown"), guide(3, "unknown"), guide(2, "unknown")])
            .await;
        assert_eq!(restored, 2);

        let ids: Vec<u64> = store.list(None).await.iter().map(|g| g.file_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.get(FileId(3)).await.unwrap().creator, "0xowner");
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let store = Arc::new(GuideStore::new());
        let mut handles = Vec::new();
        for id in 0..64u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add(guide(id, "0xabc")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len().await, 64);
    }
}
