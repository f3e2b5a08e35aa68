//! Error types shared by the store, the ingestion pipeline, and the
//! read-side aggregations.

use thiserror::Error;

/// Outage tracker errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A snapshot file is corrupt or not in the expected format.
    #[error("snapshot decode error ({source_name}): {message}")]
    SnapshotDecode {
        source_name: String,
        message: String,
    },

    /// The geometry store rejected or failed a batch insert.
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// A read against the geometry store failed, or returned a stored
    /// geometry that could not be decoded.
    #[error("store query error: {0}")]
    StoreQuery(String),

    /// An alert could not be delivered.
    #[error("notification delivery error: {0}")]
    NotificationDelivery(String),

    /// A polygon cannot be represented in the fixed-precision encoding.
    #[error("geometry error: {0}")]
    Geometry(String),
}

impl Error {
    /// Build a [`Error::SnapshotDecode`] for the named input.
    pub fn decode(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SnapshotDecode {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Result type for outage tracker operations.
pub type Result<T> = std::result::Result<T, Error>;
