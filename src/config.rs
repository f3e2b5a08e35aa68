//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/outages.sqlite"
//!
//! [ingest]
//! directory = "./snapshots"
//! include_globs = ["*.zstd"]
//! interval_secs = 1800
//!
//! [alerts]
//! provider = "mailgun"
//! domain = "mg.example.org"
//! recipient = "ops@example.org"
//!
//! [display]
//! utc_offset_hours = -4
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! Only `[db]` and `[ingest].directory` are required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Directory the scraper drops snapshot files into.
    pub directory: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Fixed delay between watch passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub recursive: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.zstd".to_string()]
}
fn default_interval_secs() -> u64 {
    1800
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default = "default_alert_provider")]
    pub provider: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    /// Name of the environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_alert_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            provider: default_alert_provider(),
            domain: None,
            recipient: None,
            sender_name: default_sender_name(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_alert_timeout_secs(),
            base_url: None,
        }
    }
}

fn default_alert_provider() -> String {
    "log".to_string()
}
fn default_sender_name() -> String {
    "Monitoring Power Outage".to_string()
}
fn default_api_key_env() -> String {
    "MAILGUN_API_KEY".to_string()
}
fn default_alert_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Offset applied when printing timestamps. Storage stays in UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

fn default_utc_offset_hours() -> i32 {
    -4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    1800
}
fn default_cache_capacity() -> u64 {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must not be empty");
    }

    if config.ingest.interval_secs == 0 {
        anyhow::bail!("ingest.interval_secs must be > 0");
    }

    if !(-14..=14).contains(&config.display.utc_offset_hours) {
        anyhow::bail!("display.utc_offset_hours must be in [-14, 14]");
    }

    match config.alerts.provider.as_str() {
        "disabled" | "log" => {}
        "mailgun" => {
            if config.alerts.domain.is_none() {
                anyhow::bail!("alerts.domain must be specified when provider is 'mailgun'");
            }
            if config.alerts.recipient.is_none() {
                anyhow::bail!("alerts.recipient must be specified when provider is 'mailgun'");
            }
        }
        other => anyhow::bail!(
            "Unknown alerts provider: '{}'. Must be disabled, log, or mailgun.",
            other
        ),
    }

    Ok(config)
}
