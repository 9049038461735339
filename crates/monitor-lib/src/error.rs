//! Error types shared across the monitor

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the ingestion pipeline and the reading store.
///
/// The taxonomy separates caller mistakes (rejected before any state is
/// touched) from persistence outages (the same input may be resubmitted
/// once the store recovers).
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The referenced device is not provisioned.
    #[error("unknown device {0}")]
    UnknownDevice(i64),

    /// The reading's timestamp is not strictly after the last accepted one.
    #[error("reading for device {device_id} at {timestamp} is not after last accepted {last_accepted}")]
    DuplicateOrOutOfOrder {
        device_id: i64,
        timestamp: DateTime<Utc>,
        last_accepted: DateTime<Utc>,
    },

    /// The submitted reading payload is structurally invalid.
    #[error("malformed reading: {0}")]
    MalformedReading(String),

    /// The referenced alert does not exist.
    #[error("unknown alert {0}")]
    UnknownAlert(i64),

    /// The persistence layer is unreachable or rejected the operation.
    /// No cache or tracker state advances when this is returned.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// True for caller mistakes that were rejected without side effects.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MonitorError::UnknownDevice(_)
                | MonitorError::DuplicateOrOutOfOrder { .. }
                | MonitorError::MalformedReading(_)
                | MonitorError::UnknownAlert(_)
        )
    }

    /// True when the caller is expected to retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MonitorError::TransientStore(_))
    }
}

impl From<sqlx::Error> for MonitorError {
    fn from(err: sqlx::Error) -> Self {
        MonitorError::TransientStore(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
