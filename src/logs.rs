//! Bounded in-memory log ring and request-logging middleware.
//!
//! The ring keeps the most recent `capacity` entries (oldest discarded
//! first) and is exposed over `GET /api/logs`. Every `/api/*` request
//! except the log endpoint itself is recorded by [`log_requests`].

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;

use crate::models::LogEntry;

/// Path prefix excluded from request logging.
pub const LOGS_PATH: &str = "/api/logs";

pub struct LogRing {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Record a message stamped with the current time.
    pub async fn record(&self, message: impl Into<String>) {
        self.push(LogEntry::now(message)).await;
    }

    /// Snapshot of all entries, oldest first.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Axum middleware recording `"<METHOD> <path> -> <status>"` for API calls.
pub async fn log_requests(
    State(logs): State<Arc<LogRing>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    if path.starts_with("/api/") && !path.starts_with(LOGS_PATH) {
        let status = response.status();
        tracing::debug!(%method, %path, status = status.as_u16(), "request");
        logs.record(format!("{} {} -> {}", method, path, status.as_u16()))
            .await;
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ring_keeps_most_recent_hundred() {
        let ring = LogRing::new(100);
        for i in 0..150 {
            ring.record(format!("message {}", i)).await;
        }

        let entries = ring.entries().await;
        assert_eq!(entries.len(), 100);
        assert_eq!(entries.first().unwrap().message, "message 50");
        assert_eq!(entries.last().unwrap().message, "message 149");
    }

    #[tokio::test]
    async fn test_ring_under_capacity_keeps_all() {
        let ring = LogRing::new(100);
        ring.push(LogEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            message: "hello".to_string(),
        })
        .await;
        assert_eq!(ring.len().await, 1);
        assert_eq!(ring.entries().await[0].timestamp, "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let ring = LogRing::new(0);
        ring.record("a").await;
        ring.record("b").await;
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.entries().await[0].message, "b");
    }
}
