// ---------------------------------------------------------------------------
// Inventory synchronization
// ---------------------------------------------------------------------------
//
// Walks the equipment inventory and pulls fresh CVEs for each CPE. A single
// background task owns sync execution, firing on a fixed interval tick and
// on manual triggers; trigger requests arriving while one is already pending
// coalesce instead of queueing.

use std::sync::Arc;
use std::time::Duration;

use cvewatch_db::InventoryStore;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::client::VulnFeed;
use crate::ingest;

/// Default interval between automatic sync runs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of one full inventory sync run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    /// Equipment rows visited.
    pub equipments: usize,
    /// CVE rows newly inserted across all CPEs.
    pub inserted: usize,
    /// CPEs whose fetch or ingest failed and were skipped.
    pub failures: usize,
}

/// Fetch and ingest CVEs for every equipment row, sequentially. One CPE's
/// failure never aborts the run: it is logged with its transient/permanent
/// classification and counted in the report.
pub async fn sync_inventory(feed: &dyn VulnFeed, store: &Mutex<InventoryStore>) -> SyncReport {
    let equipments = {
        let store = store.lock().await;
        match store.list_equipment() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "failed to list inventory, skipping sync run");
                return SyncReport::default();
            }
        }
    };

    info!(equipments = equipments.len(), "starting inventory sync");
    let mut report = SyncReport {
        equipments: equipments.len(),
        ..SyncReport::default()
    };

    for equipment in &equipments {
        match feed.fetch_for_cpe(&equipment.cpe).await {
            Ok(raw) => {
                let store = store.lock().await;
                match ingest::ingest_vulnerabilities(&store, &raw, &equipment.cpe) {
                    Ok(inserted) => {
                        info!(
                            name = %equipment.name,
                            cpe = %equipment.cpe,
                            fetched = raw.len(),
                            inserted,
                            "equipment synced"
                        );
                        report.inserted += inserted;
                    }
                    Err(e) => {
                        warn!(error = %e, cpe = %equipment.cpe, "failed to store fetched CVEs");
                        report.failures += 1;
                    }
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    cpe = %equipment.cpe,
                    transient = e.is_transient(),
                    "feed fetch failed, skipping equipment"
                );
                report.failures += 1;
            }
        }
    }

    info!(
        equipments = report.equipments,
        inserted = report.inserted,
        failures = report.failures,
        "inventory sync complete"
    );
    report
}

/// Handle for requesting an on-demand sync run.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<()>,
}

impl SyncHandle {
    /// Request a sync run. Returns false when a request is already pending
    /// (the two runs coalesce) or the scheduler task has stopped.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Spawn the single background task that owns sync execution. Runs fire on
/// the interval tick and on [`SyncHandle::trigger`]; both paths serialize
/// through this task, so two runs can never write concurrently.
pub fn spawn_sync_scheduler(
    feed: Arc<dyn VulnFeed>,
    store: Arc<Mutex<InventoryStore>>,
    interval: Duration,
) -> SyncHandle {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The interval's first tick completes immediately; consume it so a
        // full sync does not run before the server is reachable.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("scheduled sync tick");
                }
                request = rx.recv() => {
                    if request.is_none() {
                        info!("all sync handles dropped, scheduler stopping");
                        break;
                    }
                    info!("manual sync requested");
                }
            }
            sync_inventory(feed.as_ref(), &store).await;
        }
    });

    SyncHandle { tx }
}
