// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use cvewatch_db::InventoryStore;
use cvewatch_feed::{DEFAULT_SYNC_INTERVAL, SyncHandle, VulnFeed, spawn_sync_scheduler};
use tokio::sync::Mutex;

/// Global application state for the API server.
pub struct AppState {
    /// Persistent inventory + CVE database. rusqlite connections are not
    /// `Sync`, so every handler locks, queries, unlocks. The scheduler task
    /// shares the same connection through this mutex.
    pub store: Arc<Mutex<InventoryStore>>,
    /// Vulnerability feed used for cache-miss lookups and sync runs.
    pub feed: Arc<dyn VulnFeed>,
    /// Handle into the background sync scheduler.
    pub sync: SyncHandle,
}

impl AppState {
    /// Wire the state and spawn the sync scheduler. Must be called inside a
    /// tokio runtime.
    pub fn new(store: InventoryStore, feed: Arc<dyn VulnFeed>, sync_interval: Duration) -> Self {
        let store = Arc::new(Mutex::new(store));
        let sync = spawn_sync_scheduler(feed.clone(), store.clone(), sync_interval);
        Self { store, feed, sync }
    }

    /// Create an AppState with an in-memory database (for testing).
    pub fn new_in_memory(feed: Arc<dyn VulnFeed>) -> Self {
        let store = InventoryStore::open_in_memory().expect("failed to open in-memory database");
        Self::new(store, feed, DEFAULT_SYNC_INTERVAL)
    }
}
