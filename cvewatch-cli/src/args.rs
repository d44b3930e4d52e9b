use std::path::PathBuf;

use clap::Parser;

/// cvewatch — track NVD CVEs for an IT equipment inventory
#[derive(Parser, Debug)]
#[command(
    name = "cvewatch",
    version,
    about = "Inventory-driven CVE tracker backed by the NVD feed"
)]
pub struct Args {
    // --- Server flags ---
    /// Start the HTTP API and dashboard server
    #[arg(long = "serve")]
    pub serve: bool,

    /// Listen address for the API server
    #[arg(
        long = "listen",
        value_name = "ADDR:PORT",
        default_value = "127.0.0.1:8000"
    )]
    pub listen: String,

    /// Directory of dashboard assets to serve at / (API only when omitted)
    #[arg(long = "static-dir", value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Hours between automatic inventory syncs while serving
    #[arg(long = "sync-interval", value_name = "HOURS", default_value = "24")]
    pub sync_interval_hours: u64,

    // --- One-shot commands ---
    /// Fetch CVEs for every inventory CPE once and exit
    #[arg(long = "sync")]
    pub sync: bool,

    /// Import equipment from a JSON file (an array of equipment objects) and exit
    #[arg(long = "import", value_name = "FILE")]
    pub import: Option<PathBuf>,

    /// Print the inventory with a CPE validity column and exit
    #[arg(long = "report")]
    pub report: bool,

    // --- Database flags ---
    /// Path to the SQLite database (default: per-user data directory)
    #[arg(long = "db", value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Increase verbosity level (use -v or -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
