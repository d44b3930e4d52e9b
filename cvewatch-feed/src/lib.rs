pub mod client;
pub mod ingest;
pub mod sync;

pub use client::{
    CvssData, DEFAULT_FEED_URL, Description, FeedError, MetricEntry, Metrics, NvdClient,
    RawVulnerability, VulnFeed,
};
pub use ingest::{ingest_vulnerabilities, map_vulnerability};
pub use sync::{
    DEFAULT_SYNC_INTERVAL, SyncHandle, SyncReport, spawn_sync_scheduler, sync_inventory,
};
