use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One row per committed snapshot, empty ones included.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            timestamp INTEGER PRIMARY KEY,
            record_count INTEGER NOT NULL,
            source_name TEXT,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outage_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            twkb BLOB NOT NULL,
            min_x REAL NOT NULL,
            min_y REAL NOT NULL,
            max_x REAL NOT NULL,
            max_y REAL NOT NULL,
            FOREIGN KEY (timestamp) REFERENCES snapshots(timestamp)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outage_records_timestamp ON outage_records(timestamp)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outage_records_bbox ON outage_records(min_x, max_x, min_y, max_y)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
