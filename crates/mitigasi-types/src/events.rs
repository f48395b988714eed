//! Domain events exchanged over the broker topic.
//!
//! Districts publish a [`SyncEvent`] whenever their source data changes;
//! the city's event synchronizer consumes them in delivery order.
//!
//! Wire format:
//!
//! ```json
//! {"action": "INCIDENT_CREATED", "kecamatan_id": 4, "timestamp": "...", "payload": {...}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DistrictId;

/// What changed in the district.
///
/// Unknown action names decode into [`SyncAction::Other`] so that a
/// consumer can log and skip them instead of failing the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncAction {
    /// A new incident was reported.
    IncidentCreated,
    /// A new resident was registered.
    ResidentAdded,
    /// Any action this build does not understand.
    Other(String),
}

impl SyncAction {
    /// The wire name of this action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::IncidentCreated => "INCIDENT_CREATED",
            Self::ResidentAdded => "RESIDENT_ADDED",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for SyncAction {
    fn from(name: String) -> Self {
        match name.as_str() {
            "INCIDENT_CREATED" => Self::IncidentCreated,
            "RESIDENT_ADDED" => Self::ResidentAdded,
            _ => Self::Other(name),
        }
    }
}

impl From<SyncAction> for String {
    fn from(action: SyncAction) -> Self {
        match action {
            SyncAction::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl core::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain event as carried on the broker topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// What happened.
    pub action: SyncAction,
    /// The district the event originated from.
    #[serde(rename = "kecamatan_id")]
    pub district_id: DistrictId,
    /// When the district emitted the event.
    pub timestamp: DateTime<Utc>,
    /// Action-specific details. Opaque to the transport.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SyncEvent {
    /// Build an event stamped with the current time.
    pub fn new(action: SyncAction, district_id: DistrictId, payload: serde_json::Value) -> Self {
        Self {
            action,
            district_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Read a string field from the payload, if the payload is an object
    /// and the field is a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}
