//! Outage timeline for a single location.
//!
//! Used by both the `otrack episodes` CLI command and `GET /episodes`.

use anyhow::Result;
use outage_tracker_core::episode::{self, EpisodeReport};
use outage_tracker_core::store::GeometryStore;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db;
use crate::display::{format_timestamp, minutes};
use crate::models::Location;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodesResponse {
    pub location: Location,
    #[serde(flatten)]
    pub report: EpisodeReport,
    pub median_duration_secs: Option<f64>,
}

/// Core episodes function returning structured data (used by CLI and server).
pub async fn episodes_at<S: GeometryStore + ?Sized>(
    store: &S,
    location: Location,
) -> Result<EpisodesResponse> {
    let point = location.to_point()?;
    let report = episode::reconstruct(store, point).await?;
    Ok(EpisodesResponse {
        location,
        median_duration_secs: report.median_duration_secs(),
        report,
    })
}

pub async fn run_episodes(config: &Config, location: Location, json: bool) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = episodes_at(&store, location).await;
    store.close().await;
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let offset = config.display.utc_offset_hours;
    let episodes = &response.report.episodes;
    match response.median_duration_secs {
        Some(median) => println!(
            "{} outages at {:.6}, {:.6}, median duration {} minutes",
            episodes.len(),
            location.lat,
            location.lon,
            minutes(median)
        ),
        None => println!(
            "no outages at {:.6}, {:.6} ({} snapshots checked)",
            location.lat,
            location.lon,
            response.report.series.len()
        ),
    }
    for (i, e) in episodes.iter().enumerate() {
        println!(
            "  outage {}: {}, about {} minutes{}",
            i + 1,
            format_timestamp(e.start, offset),
            minutes(e.duration_secs as f64),
            if e.point_like { " (brief)" } else { "" }
        );
    }
    Ok(())
}
