//! # Outage Tracker CLI (`otrack`)
//!
//! ## Usage
//!
//! ```bash
//! otrack --config ./config/otrack.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `otrack init` | Create the SQLite database and run schema migrations |
//! | `otrack ingest` | Run one ingestion pass over the snapshot directory |
//! | `otrack watch` | Ingest on a fixed interval, alerting on failures and stalls |
//! | `otrack grid` | Outage-density grid around a location |
//! | `otrack episodes` | Outage episodes at a location |
//! | `otrack timestamps` | List snapshot timestamps with outages |
//! | `otrack snapshot <ts>` | Outage polygons captured at one timestamp |
//! | `otrack stats` | Database summary |
//! | `otrack serve` | Start the HTTP read API |
//!
//! Logs go to stderr (`RUST_LOG` overrides the level); command output goes
//! to stdout.

use clap::{Parser, Subcommand};
use outage_tracker::models::Location;
use outage_tracker::{config, episodes, grid, ingest, migrate, server, stats, timestamps};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Outage Tracker — power-outage snapshot ingestion with outage-density
/// grids and per-address outage timelines.
#[derive(Parser)]
#[command(
    name = "otrack",
    about = "Outage Tracker — power-outage snapshot ingestion and analysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/otrack.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// Run one ingestion pass.
    ///
    /// Commits every snapshot file newer than the latest stored timestamp,
    /// oldest first.
    Ingest {
        /// Ignore the high-water mark and ingest every file whose timestamp
        /// is not stored yet.
        #[arg(long)]
        full: bool,

        /// List the files a pass would ingest without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest continuously, sleeping `ingest.interval_secs` between passes.
    Watch {
        /// Run a single pass (with alerting) and exit.
        #[arg(long)]
        once: bool,
    },

    /// Outage-density hexagon grid around a location.
    Grid {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Map zoom level, clamped to 9..=22.
        #[arg(long, default_value_t = grid::DEFAULT_ZOOM)]
        zoom: u8,

        /// Print the GeoJSON feature collection.
        #[arg(long)]
        json: bool,
    },

    /// Outage episodes at a location.
    Episodes {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        json: bool,
    },

    /// List snapshot timestamps that recorded outages.
    Timestamps,

    /// Show the outage polygons captured at one timestamp.
    Snapshot {
        /// Unix timestamp (seconds).
        timestamp: i64,

        /// Print the GeoJSON feature collection.
        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats,

    /// Start the HTTP read API on `server.bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { full, dry_run } => {
            ingest::run_ingest(&cfg, full, dry_run).await?;
        }
        Commands::Watch { once } => {
            ingest::run_watch(&cfg, once).await?;
        }
        Commands::Grid {
            lat,
            lon,
            zoom,
            json,
        } => {
            grid::run_grid(&cfg, Location::new(lat, lon), zoom, json).await?;
        }
        Commands::Episodes { lat, lon, json } => {
            episodes::run_episodes(&cfg, Location::new(lat, lon), json).await?;
        }
        Commands::Timestamps => {
            timestamps::run_timestamps(&cfg).await?;
        }
        Commands::Snapshot { timestamp, json } => {
            timestamps::run_snapshot(&cfg, timestamp, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
