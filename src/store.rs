//! Current market snapshot with broadcast capabilities

use crate::types::{CoinSummary, Snapshot, SnapshotError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Holder of the one current `Snapshot`
///
/// Uses a tokio watch channel so any number of consumers can read the latest
/// snapshot or subscribe to replacements. Readers clone an `Arc` and never
/// hold the channel lock across their own work.
pub struct SnapshotStore {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Creates a store holding an empty snapshot
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::empty()));
        Self { tx }
    }

    /// Replaces the current snapshot with freshly fetched coins
    ///
    /// Clears any previously recorded error.
    pub fn publish(&self, coins: Vec<CoinSummary>, fetched_at: DateTime<Utc>) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot::new(coins, fetched_at));
        self.tx.send_replace(snapshot.clone());
        tracing::debug!(count = snapshot.len(), "Published market snapshot");
        snapshot
    }

    /// Marks the current snapshot as failed without touching its coins
    pub fn record_error(&self, error: SnapshotError) -> Arc<Snapshot> {
        self.tx
            .send_modify(|current| *current = Arc::new(current.with_error(error)));
        self.current()
    }

    /// Returns the current snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// Error recorded by the most recent refresh, if it failed
    pub fn last_error(&self) -> Option<SnapshotError> {
        self.tx.borrow().error.clone()
    }

    /// Subscribes to snapshot replacements
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn coin(id: &str, rank: u32) -> CoinSummary {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "symbol": id,
            "name": id,
            "market_cap_rank": rank
        }))
        .unwrap()
    }

    #[test]
    fn test_starts_empty() {
        let store = SnapshotStore::new();
        let snapshot = store.current();
        assert!(snapshot.is_empty());
        assert!(snapshot.fetched_at.is_none());
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_error_keeps_previous_coins_and_publish_clears_it() {
        let store = SnapshotStore::new();
        let fetched_at = Utc::now();
        store.publish(vec![coin("bitcoin", 1), coin("ethereum", 2)], fetched_at);

        let failed = store.record_error(SnapshotError {
            kind: ErrorKind::Network,
            message: "HTTP 500".to_string(),
            occurred_at: Utc::now(),
        });
        assert_eq!(failed.len(), 2);
        assert_eq!(failed.fetched_at, Some(fetched_at));
        assert_eq!(store.last_error().map(|e| e.kind), Some(ErrorKind::Network));

        store.publish(vec![coin("bitcoin", 1)], Utc::now());
        assert!(store.last_error().is_none());
        assert_eq!(store.current().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_replacements() {
        let store = SnapshotStore::new();
        let mut rx = store.subscribe();

        store.publish(vec![coin("bitcoin", 1)], Utc::now());

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().coins[0].id, "bitcoin");
    }
}
