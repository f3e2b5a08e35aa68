//! Operational alerts from the ingest loop.
//!
//! Two conditions are reported: a pass that failed, and a pass that found
//! nothing new to ingest. Delivery is best-effort: a notifier that cannot
//! deliver returns [`Error::NotificationDelivery`], which the loop logs and
//! drops.
//!
//! Providers, selected by `alerts.provider`:
//! - **`disabled`**: drops every alert.
//! - **`log`**: emits the alert as a `tracing` warning.
//! - **`mailgun`**: sends a plain-text email through the Mailgun messages
//!   API. The API key is read at construction from the environment
//!   variable named by `alerts.api_key_env`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outage_tracker_core::error::Error;
use std::time::Duration;

use crate::config::AlertsConfig;

const MAILGUN_BASE_URL: &str = "https://api.mailgun.net";
const SUBJECT: &str = "Monitoring alert";

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// An ingestion pass aborted.
    Failure {
        message: String,
        detected_at: DateTime<Utc>,
    },
    /// A full scan found no snapshot newer than the high-water mark.
    NoNewSnapshots {
        idle_secs: u64,
        detected_at: DateTime<Utc>,
    },
}

impl Alert {
    pub fn failure(message: impl Into<String>) -> Self {
        Alert::Failure {
            message: message.into(),
            detected_at: Utc::now(),
        }
    }

    pub fn no_new_snapshots(idle_secs: u64) -> Self {
        Alert::NoNewSnapshots {
            idle_secs,
            detected_at: Utc::now(),
        }
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        match self {
            Alert::Failure { detected_at, .. } | Alert::NoNewSnapshots { detected_at, .. } => {
                *detected_at
            }
        }
    }

    /// One-line summary of what went wrong.
    pub fn warning(&self) -> String {
        match self {
            Alert::Failure { message, .. } => message.clone(),
            Alert::NoNewSnapshots { idle_secs, .. } => format!(
                "No new snapshot files were written to disk in {} minutes",
                idle_secs / 60
            ),
        }
    }

    /// Full message text.
    pub fn body(&self) -> String {
        format!(
            "{}. UTC time when something went wrong: {}",
            self.warning(),
            self.detected_at().format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), Error>;
}

/// Send `alert`, logging instead of failing when delivery does not work.
pub async fn notify_best_effort(notifier: &dyn AlertNotifier, alert: &Alert) {
    match notifier.send(alert).await {
        Ok(()) => tracing::debug!(provider = notifier.name(), "alert delivered"),
        Err(e) => tracing::warn!(provider = notifier.name(), error = %e, "alert dropped"),
    }
}

pub struct DisabledNotifier;

#[async_trait]
impl AlertNotifier for DisabledNotifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn send(&self, _alert: &Alert) -> Result<(), Error> {
        Ok(())
    }
}

pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), Error> {
        tracing::warn!(alert = %alert.body(), "monitoring alert");
        Ok(())
    }
}

/// Email through the Mailgun messages API (form POST, basic auth as
/// user `api`).
pub struct MailgunNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
    recipient: String,
}

impl MailgunNotifier {
    pub fn new(config: &AlertsConfig) -> Result<Self> {
        let domain = config
            .domain
            .clone()
            .ok_or_else(|| anyhow::anyhow!("alerts.domain required for mailgun provider"))?;
        let recipient = config
            .recipient
            .clone()
            .ok_or_else(|| anyhow::anyhow!("alerts.recipient required for mailgun provider"))?;
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base = config
            .base_url
            .as_deref()
            .unwrap_or(MAILGUN_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{}/v3/{}/messages", base, domain),
            api_key,
            from: format!("{} <mailgun@{}>", config.sender_name, domain),
            recipient,
        })
    }
}

#[async_trait]
impl AlertNotifier for MailgunNotifier {
    fn name(&self) -> &str {
        "mailgun"
    }

    async fn send(&self, alert: &Alert) -> Result<(), Error> {
        let body = alert.body();
        let form = [
            ("from", self.from.as_str()),
            ("to", self.recipient.as_str()),
            ("subject", SUBJECT),
            ("text", body.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::NotificationDelivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::NotificationDelivery(format!(
                "mailgun returned {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

pub fn create_notifier(config: &AlertsConfig) -> Result<Box<dyn AlertNotifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledNotifier)),
        "log" => Ok(Box::new(LogNotifier)),
        "mailgun" => Ok(Box::new(MailgunNotifier::new(config)?)),
        other => bail!(
            "Unknown alerts provider: '{}'. Must be disabled, log, or mailgun.",
            other
        ),
    }
}
