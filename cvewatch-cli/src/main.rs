mod args;

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::Args;
use cvewatch_api::ApiConfig;
use cvewatch_db::{InventoryStore, NewEquipment};
use cvewatch_feed::{NvdClient, sync_inventory};

/// Well-formed CPE 2.3 identifiers start with this prefix.
const CPE_PREFIX: &str = "cpe:2.3:";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing based on verbosity
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Handle --import: load a JSON inventory seed and exit
    if let Some(ref path) = args.import {
        return import_inventory(path, args.db.as_deref());
    }

    // Handle --report: print the inventory table and exit
    if args.report {
        return show_report(args.db.as_deref());
    }

    // Handle --sync: run a one-shot NVD sync and exit
    if args.sync {
        return run_sync(args.db.as_deref()).await;
    }

    // Handle --serve: start the API server and block
    if args.serve {
        return serve(&args).await;
    }

    bail!("nothing to do: pass --serve, --sync, --import FILE, or --report (see --help)")
}

/// Open the inventory store at `--db` or the per-user default location.
fn open_store(db: Option<&Path>) -> Result<InventoryStore> {
    let store = match db {
        Some(path) => InventoryStore::open(path),
        None => InventoryStore::open_default(),
    };
    store.map_err(|e| anyhow::anyhow!("failed to open inventory database: {e}"))
}

/// Import equipment from a JSON seed file; entries whose CPE is already
/// present are skipped rather than rejected.
fn import_inventory(path: &Path, db: Option<&Path>) -> Result<()> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let items: Vec<NewEquipment> = serde_json::from_str(&data)
        .with_context(|| format!("invalid inventory JSON in {}", path.display()))?;
    info!(file = %path.display(), count = items.len(), "parsed inventory seed");

    let store = open_store(db)?;
    let inserted = store
        .import_equipment(&items)
        .map_err(|e| anyhow::anyhow!("failed to import inventory: {e}"))?;

    println!(
        "Imported {inserted} of {} equipment(s) ({} already present).",
        items.len(),
        items.len() - inserted
    );
    Ok(())
}

/// Print the inventory as an aligned table with a CPE validity column.
fn show_report(db: Option<&Path>) -> Result<()> {
    let store = open_store(db)?;
    let equipments = store
        .list_equipment()
        .map_err(|e| anyhow::anyhow!("failed to list equipment: {e}"))?;

    if equipments.is_empty() {
        println!("No equipment found.");
        return Ok(());
    }

    println!("{:<24} {:<6} {:<4} CPE", "NAME", "VALID", "QTY");
    for eq in &equipments {
        let valid = if eq.cpe.starts_with(CPE_PREFIX) {
            "yes"
        } else {
            "no"
        };
        println!("{:<24} {:<6} {:<4} {}", eq.name, valid, eq.quantity, eq.cpe);
    }
    Ok(())
}

/// Fetch CVEs from NVD for every inventory CPE, once.
async fn run_sync(db: Option<&Path>) -> Result<()> {
    let api_key = std::env::var("NVD_API_KEY").ok();
    if api_key.is_none() {
        eprintln!("NVD_API_KEY not set; pacing requests to the anonymous rate limit.");
    }
    let client = NvdClient::new(api_key).context("failed to build NVD client")?;
    let store = Mutex::new(open_store(db)?);

    eprintln!("Syncing inventory CPEs against NVD (this may take a minute)...");
    let report = sync_inventory(&client, &store).await;
    eprintln!(
        "Synced {} equipment(s): {} new CVE(s), {} fetch failure(s).",
        report.equipments, report.inserted, report.failures
    );
    if report.failures > 0 {
        eprintln!("Warning: some CPE fetches failed; re-run --sync to retry.");
    }
    Ok(())
}

/// Start the HTTP API server and block until shutdown.
async fn serve(args: &Args) -> Result<()> {
    if args.sync_interval_hours == 0 {
        bail!("--sync-interval must be at least 1 hour");
    }
    let addr: std::net::SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid --listen address: {}", args.listen))?;

    let config = ApiConfig {
        listen_addr: addr,
        db_path: args.db.clone(),
        nvd_api_key: std::env::var("NVD_API_KEY").ok(),
        static_dir: args.static_dir.clone(),
        sync_interval: Duration::from_secs(args.sync_interval_hours * 60 * 60),
    };

    eprintln!("cvewatch API server listening on http://{addr}");
    if config.nvd_api_key.is_some() {
        eprintln!("  NVD API key: set");
    } else {
        eprintln!("  NVD API key: not set (feed requests are paced to the anonymous limit)");
    }
    if let Some(ref dir) = config.static_dir {
        eprintln!("  Dashboard assets: {}", dir.display());
    }

    cvewatch_api::start_server(config).await
}
