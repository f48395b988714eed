//! Emergency broadcast payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// An alert multicast to every connected streaming client.
///
/// Never persisted. Serialized as the `data` of an `alert` stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BroadcastMessage {
    /// Kind of incident the alert is about (`Banjir`, `Longsor`, ...).
    #[serde(rename = "jenis")]
    pub incident_type: String,
    /// Severity or scope label chosen by the sender.
    #[serde(rename = "level")]
    pub severity: String,
    /// Free-form message for residents.
    #[serde(rename = "pesan")]
    pub free_text: String,
    /// When the alert was issued.
    #[serde(rename = "waktu")]
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    /// Build a message stamped with the current time.
    pub fn new(
        incident_type: impl Into<String>,
        severity: impl Into<String>,
        free_text: impl Into<String>,
    ) -> Self {
        Self {
            incident_type: incident_type.into(),
            severity: severity.into(),
            free_text: free_text.into(),
            timestamp: Utc::now(),
        }
    }
}
