//! Outage episodes at a single location.
//!
//! The system-wide impacted-area series gives the sampling clock: every
//! timestamp at which any outage was recorded. A location is "out" at a
//! sample when one of that sample's polygons covers it. Consecutive
//! covered samples form an episode; the first uncovered sample closes it.
//!
//! Episodes built from a single sample (or samples closer together than
//! [`FLOOR_THRESHOLD_SECS`]) have no measurable length, so their duration
//! is floored to [`FLOOR_DURATION_SECS`].

use std::collections::BTreeSet;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::AreaSample;
use crate::store::GeometryStore;

pub const FLOOR_THRESHOLD_SECS: i64 = 15;
pub const FLOOR_DURATION_SECS: i64 = 600;
/// Episodes shorter than this are drawn as points rather than spans.
pub const POINT_LIKE_SECS: i64 = 1200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Covered samples, ascending. Never empty.
    pub samples: Vec<AreaSample>,
    pub start: i64,
    pub end: i64,
    pub duration_secs: i64,
    pub point_like: bool,
}

impl Episode {
    fn from_run(samples: Vec<AreaSample>) -> Option<Self> {
        let start = samples.first()?.timestamp;
        let end = samples.last()?.timestamp;
        let elapsed = end - start;
        let duration_secs = if elapsed < FLOOR_THRESHOLD_SECS {
            FLOOR_DURATION_SECS
        } else {
            elapsed
        };
        Some(Self {
            samples,
            start,
            end,
            duration_secs,
            point_like: duration_secs < POINT_LIKE_SECS,
        })
    }
}

/// Episodes at one location plus the series they were cut from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episodes: Vec<Episode>,
    pub series: Vec<AreaSample>,
    /// Largest system-wide area in the series; episodes are drawn at this
    /// height against the series. 0 for an empty series.
    pub marker_level: f64,
}

impl EpisodeReport {
    /// Median episode duration in seconds, averaging the middle pair for
    /// an even count.
    pub fn median_duration_secs(&self) -> Option<f64> {
        let mut durations: Vec<i64> = self.episodes.iter().map(|e| e.duration_secs).collect();
        if durations.is_empty() {
            return None;
        }
        durations.sort_unstable();
        let mid = durations.len() / 2;
        Some(if durations.len() % 2 == 0 {
            (durations[mid - 1] + durations[mid]) as f64 / 2.0
        } else {
            durations[mid] as f64
        })
    }
}

/// Split `series` into runs of samples whose timestamp is in `hits`.
/// Hits absent from the series are ignored.
pub fn segment_episodes(series: &[AreaSample], hits: &[i64]) -> Vec<Episode> {
    let hits: BTreeSet<i64> = hits.iter().copied().collect();
    let mut episodes = Vec::new();
    let mut run: Vec<AreaSample> = Vec::new();

    for sample in series {
        if hits.contains(&sample.timestamp) {
            run.push(*sample);
        } else if !run.is_empty() {
            episodes.extend(Episode::from_run(std::mem::take(&mut run)));
        }
    }
    episodes.extend(Episode::from_run(run));
    episodes
}

/// Reconstruct the outage episodes at `point` (`x` = longitude,
/// `y` = latitude).
pub async fn reconstruct<S: GeometryStore + ?Sized>(
    store: &S,
    point: Point<f64>,
) -> Result<EpisodeReport> {
    let series = store.total_area_series().await?;
    let hits = store.timestamps_covering(point).await?;
    let episodes = segment_episodes(&series, &hits);
    let marker_level = series.iter().map(|s| s.area).fold(0.0, f64::max);
    Ok(EpisodeReport {
        episodes,
        series,
        marker_level,
    })
}
