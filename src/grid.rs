//! Outage-density grid around a location.
//!
//! Used by both the `otrack grid` CLI command and `GET /grid`.

use anyhow::Result;
use outage_tracker_core::grid::{self, GridResult};
use outage_tracker_core::store::GeometryStore;

use crate::config::Config;
use crate::db;
use crate::models::Location;
use crate::sqlite_store::SqliteStore;

/// Zoom used when a caller does not pick one.
pub const DEFAULT_ZOOM: u8 = 15;

/// Core grid function returning structured data (used by CLI and server).
pub async fn grid_around<S: GeometryStore + ?Sized>(
    store: &S,
    location: Location,
    zoom: u8,
) -> Result<GridResult> {
    let center = location.to_point()?;
    Ok(grid::aggregate(store, center, zoom).await?)
}

pub async fn run_grid(config: &Config, location: Location, zoom: u8, json: bool) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = grid_around(&store, location, zoom).await;
    store.close().await;
    let grid = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&grid.to_feature_collection())?);
        return Ok(());
    }

    println!(
        "grid around {:.6}, {:.6} (zoom {}, {} join)",
        location.lat,
        location.lon,
        grid.sizing.zoom,
        grid.join_mode.as_str()
    );
    println!("  radius:     {:.1} m", grid.sizing.radius_m);
    println!("  cell size:  {:.6} deg", grid.sizing.cell_size);
    println!("  cells:      {}", grid.cells.len());
    println!("  max outage: {}", grid.max_outage);

    let mut hot: Vec<_> = grid.cells.iter().filter(|c| c.outage > 0).collect();
    hot.sort_by(|a, b| b.outage.cmp(&a.outage).then(a.id.cmp(&b.id)));
    if !hot.is_empty() {
        println!();
        println!("  {:>6} {:>8} {:>10}", "CELL", "OUTAGES", "SHADE");
        for cell in hot.iter().take(10) {
            println!(
                "  {:>6} {:>8} {:>10.2}",
                cell.id,
                cell.outage,
                grid.normalized(cell)
            );
        }
    }
    Ok(())
}
