//! Snapshot file discovery and decoding.
//!
//! The scraper writes one file per capture, named `<prefix>_<unix-ts>.zstd`:
//! a zstd-compressed geobuf feature collection of the outage polygons
//! visible at that moment.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use geo::Polygon;
use outage_tracker_core::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::geobuf;

/// A snapshot file whose name carries a capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    /// Path relative to the ingest directory, for messages and the ledger.
    pub name: String,
    pub timestamp: i64,
}

/// Result of scanning the ingest directory.
#[derive(Debug, Default)]
pub struct Scan {
    /// Matching files, ascending by timestamp.
    pub files: Vec<SnapshotFile>,
    /// Matching files whose name carries no timestamp.
    pub unparseable: Vec<String>,
}

/// Capture timestamp from a file name: the last `_`-separated token, up to
/// the first `.`.
pub fn parse_timestamp(file_name: &str) -> Option<i64> {
    let token = file_name.rsplit('_').next()?;
    let digits = token.split('.').next()?;
    digits.parse::<i64>().ok()
}

pub fn scan_snapshots(ingest: &IngestConfig) -> Result<Scan> {
    let root = &ingest.directory;
    if !root.exists() {
        bail!("Ingest directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&ingest.include_globs)?;

    let mut walker = WalkDir::new(root).min_depth(1);
    if !ingest.recursive {
        walker = walker.max_depth(1);
    }

    let mut scan = Scan::default();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if !include_set.is_match(&rel_str) {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        match parse_timestamp(&file_name) {
            Some(timestamp) => scan.files.push(SnapshotFile {
                path: path.to_path_buf(),
                name: rel_str,
                timestamp,
            }),
            None => scan.unparseable.push(rel_str),
        }
    }

    scan.files
        .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
    scan.unparseable.sort();

    Ok(scan)
}

/// Read, decompress, and decode one snapshot file.
pub fn read_snapshot(path: &Path, name: &str) -> Result<Vec<Polygon<f64>>, Error> {
    let compressed = std::fs::read(path).map_err(|e| Error::decode(name, e.to_string()))?;
    let bytes = zstd::decode_all(compressed.as_slice())
        .map_err(|e| Error::decode(name, format!("zstd: {}", e)))?;
    geobuf::decode_polygons(name, &bytes)
}

/// Write polygons as a snapshot file, the same way the scraper does.
pub fn write_snapshot(path: &Path, polygons: &[Polygon<f64>]) -> Result<()> {
    let compressed = zstd::encode_all(geobuf::encode_polygons(polygons).as_slice(), 3)?;
    std::fs::write(path, compressed)?;
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
