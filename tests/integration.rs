use geo::{polygon, Polygon};
use outage_tracker::snapshot::write_snapshot;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const HOME: (f64, f64) = (45.446892, -75.790369);

fn otrack_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("otrack");
    path
}

fn square_around(lat: f64, lon: f64, half: f64) -> Polygon<f64> {
    polygon![
        (x: lon - half, y: lat - half),
        (x: lon + half, y: lat - half),
        (x: lon + half, y: lat + half),
        (x: lon - half, y: lat + half),
        (x: lon - half, y: lat - half),
    ]
}

/// Four snapshots: HOME is out at 1000 and 2800, restored at 4600 (only a
/// distant outage remains), and out again at 6400.
fn write_history(dir: &Path) {
    let home = square_around(HOME.0, HOME.1, 0.002);
    let elsewhere = square_around(46.8, -71.2, 0.05);
    write_snapshot(&dir.join("outages_1000.zstd"), &[home.clone(), elsewhere.clone()]).unwrap();
    write_snapshot(&dir.join("outages_2800.zstd"), &[home.clone()]).unwrap();
    write_snapshot(&dir.join("outages_4600.zstd"), &[elsewhere]).unwrap();
    write_snapshot(&dir.join("outages_6400.zstd"), &[home]).unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let snapshots = root.join("snapshots");
    fs::create_dir_all(&snapshots).unwrap();
    write_history(&snapshots);
    fs::write(snapshots.join("README.txt"), "not a snapshot").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/outages.sqlite"

[ingest]
directory = "{}/snapshots"
include_globs = ["*.zstd"]
interval_secs = 1800

[alerts]
provider = "log"

[display]
utc_offset_hours = -4

[server]
bind = "127.0.0.1:7341"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("otrack.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_otrack(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = otrack_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run otrack binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingested_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_otrack(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (stdout, stderr, ok) = run_otrack(&config_path, &["ingest"]);
    assert!(ok, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_otrack(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_otrack(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_otrack(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_commits_all_snapshots() {
    let (_tmp, config_path) = setup_test_env();

    run_otrack(&config_path, &["init"]);
    let (stdout, stderr, success) = run_otrack(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingested: 4"));
    assert!(stdout.contains("records written: 5"));
    assert!(stdout.contains("high-water mark: none -> 6400"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_twice_is_noop() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, stderr, success) = run_otrack(&config_path, &["ingest"]);
    assert!(success, "second ingest failed: {}", stderr);
    assert!(stdout.contains("ingested: 0"));
    assert!(stdout.contains("skipped: 4"));
    assert!(stdout.contains("no new snapshots"));

    let (stdout, _, _) = run_otrack(&config_path, &["stats"]);
    assert!(stdout.contains("Snapshots:  4"));
    assert!(stdout.contains("Polygons:   5"));
}

#[test]
fn test_ingest_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    run_otrack(&config_path, &["init"]);
    let (stdout, _, success) = run_otrack(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("would ingest: outages_1000.zstd"));

    let (stdout, _, _) = run_otrack(&config_path, &["stats"]);
    assert!(stdout.contains("Snapshots:  0"));
}

#[test]
fn test_grid_json() {
    let (_tmp, config_path) = ingested_env();

    let lat = format!("--lat={}", HOME.0);
    let lon = format!("--lon={}", HOME.1);
    let (stdout, stderr, success) =
        run_otrack(&config_path, &["grid", &lat, &lon, "--zoom", "15", "--json"]);
    assert!(success, "grid failed: {}", stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["type"], "FeatureCollection");
    assert_eq!(json["max_outage"], 3);
    assert_eq!(json["zoom"], 15);
    let features = json["features"].as_array().unwrap();
    assert!(!features.is_empty());
    assert!(features.iter().any(|f| f["properties"]["outage"] == 0));
}

#[test]
fn test_grid_coarse_zoom_uses_bbox_join() {
    let (_tmp, config_path) = ingested_env();

    let lat = format!("--lat={}", HOME.0);
    let lon = format!("--lon={}", HOME.1);
    let (stdout, _, success) = run_otrack(&config_path, &["grid", &lat, &lon, "--zoom", "5"]);
    assert!(success);
    assert!(stdout.contains("zoom 9, bounding_box join"));
}

#[test]
fn test_grid_extreme_zoom_is_clamped() {
    let (_tmp, config_path) = ingested_env();

    let lat = format!("--lat={}", HOME.0);
    let lon = format!("--lon={}", HOME.1);
    let (stdout, stderr, success) =
        run_otrack(&config_path, &["grid", &lat, &lon, "--zoom", "255"]);
    assert!(success, "grid failed: {}", stderr);
    assert!(stdout.contains("zoom 22, intersects join"));
}

#[test]
fn test_episodes_at_home() {
    let (_tmp, config_path) = ingested_env();

    let lat = format!("--lat={}", HOME.0);
    let lon = format!("--lon={}", HOME.1);
    let (stdout, stderr, success) = run_otrack(&config_path, &["episodes", &lat, &lon]);
    assert!(success, "episodes failed: {}", stderr);
    assert!(stdout.contains("2 outages"), "unexpected output: {}", stdout);
    assert!(stdout.contains("median duration 20 minutes"));

    let (stdout, _, _) = run_otrack(&config_path, &["episodes", &lat, &lon, "--json"]);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let episodes = json["episodes"].as_array().unwrap();
    assert_eq!(episodes.len(), 2);
    assert_eq!(episodes[0]["duration_secs"], 1800);
    assert_eq!(episodes[1]["duration_secs"], 600);
    assert_eq!(episodes[1]["point_like"], true);
}

#[test]
fn test_episodes_far_away() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) =
        run_otrack(&config_path, &["episodes", "--lat=10.0", "--lon=10.0"]);
    assert!(success);
    assert!(stdout.contains("no outages"));
}

#[test]
fn test_invalid_location_errors() {
    let (_tmp, config_path) = ingested_env();

    let (_, stderr, success) = run_otrack(&config_path, &["episodes", "--lat=95", "--lon=0"]);
    assert!(!success);
    assert!(stderr.contains("lat must be in"));
}

#[test]
fn test_timestamps_and_snapshot() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_otrack(&config_path, &["timestamps"]);
    assert!(success);
    assert!(stdout.contains("4 timestamps"));

    let (stdout, _, success) = run_otrack(&config_path, &["snapshot", "1000", "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["features"].as_array().unwrap().len(), 2);
    assert_eq!(json["features"][1]["properties"]["item"], 2);

    let (_, stderr, success) = run_otrack(&config_path, &["snapshot", "999"]);
    assert!(!success);
    assert!(stderr.contains("snapshot not found"));
}

#[test]
fn test_watch_once_reports_stall() {
    let (_tmp, config_path) = ingested_env();

    let (_, stderr, success) = run_otrack(&config_path, &["watch", "--once"]);
    assert!(success, "watch failed: {}", stderr);
    assert!(stderr.contains("No new snapshot files were written to disk in 30 minutes"));
}

#[test]
fn test_late_snapshot_needs_full() {
    let (tmp, config_path) = ingested_env();

    let late = square_around(HOME.0, HOME.1, 0.001);
    write_snapshot(&tmp.path().join("snapshots/outages_500.zstd"), &[late]).unwrap();

    let (stdout, _, _) = run_otrack(&config_path, &["ingest"]);
    assert!(stdout.contains("ingested: 0"));

    let (stdout, stderr, success) = run_otrack(&config_path, &["ingest", "--full"]);
    assert!(success, "full ingest failed: {}", stderr);
    assert!(stdout.contains("ingested: 1"));
    assert!(stdout.contains("high-water mark: 6400 -> 6400"));
}

#[test]
fn test_corrupt_snapshot_fails_pass() {
    let (tmp, config_path) = ingested_env();

    fs::write(tmp.path().join("snapshots/outages_9000.zstd"), b"garbage").unwrap();
    let (_, stderr, success) = run_otrack(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("outages_9000.zstd"));
}

#[test]
fn test_unknown_alert_provider_rejected() {
    let (tmp, config_path) = setup_test_env();

    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("provider = \"log\"", "provider = \"pager\"");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_otrack(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown alerts provider"));
    drop(tmp);
}
