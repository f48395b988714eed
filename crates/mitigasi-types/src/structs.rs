//! Summary and aggregate row types.
//!
//! Field names on the wire follow the contract already used between the
//! district and city services (`total_warga`, `kecamatan_id`, ...), while
//! the Rust names describe what the fields mean.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::DistrictId;
use crate::severity::SeverityLevel;

/// Incident type recorded by the polling path, which only sees totals.
pub const AGGREGATE_INCIDENT_TYPE: &str = "Agregat";

/// Resident category that does not count as vulnerable.
pub const NON_VULNERABLE_CATEGORY: &str = "Non-Rentan";

/// Point-in-time totals computed by a district from its own store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DistrictSummary {
    /// Number of registered residents.
    #[serde(rename = "total_warga")]
    pub total_residents: u32,
    /// Number of residents in a vulnerable category.
    #[serde(rename = "total_rentan")]
    pub total_vulnerable: u32,
    /// Number of incidents with status `Aktif`.
    #[serde(rename = "bencana_aktif")]
    pub active_incidents: u32,
}

/// Response body of `GET {base_url}/summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEnvelope {
    /// Error flag set by the district service.
    #[serde(default)]
    pub error: bool,
    /// The summary itself.
    pub data: DistrictSummary,
}

impl SummaryEnvelope {
    /// Wrap a successful summary.
    pub const fn ok(data: DistrictSummary) -> Self {
        Self { error: false, data }
    }
}

/// Latest population snapshot of one district, owned by the city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RegionalRecap {
    /// The district this row describes (unique).
    #[serde(rename = "kecamatan_id")]
    pub district_id: DistrictId,
    /// Registered residents.
    #[serde(rename = "total_warga")]
    pub total_residents: u32,
    /// Vulnerable residents.
    #[serde(rename = "total_kerentanan")]
    pub total_vulnerable: u32,
    /// When the row was last written by a synchronizer.
    #[serde(rename = "last_sync")]
    pub last_sync_time: DateTime<Utc>,
}

/// Latest incident status of one district, owned by the city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RegionalIncidentStatus {
    /// The district this row describes (unique).
    #[serde(rename = "kecamatan_id")]
    pub district_id: DistrictId,
    /// Incident type of the latest report ([`AGGREGATE_INCIDENT_TYPE`] when polled).
    #[serde(rename = "jenis_bencana")]
    pub incident_type: String,
    /// Severity derived from `active_incident_count`.
    #[serde(rename = "status_level")]
    pub severity_level: SeverityLevel,
    /// When the status was last written.
    #[serde(rename = "waktu_laporan")]
    pub report_time: DateTime<Utc>,
    /// Active incidents in the district.
    #[serde(rename = "total_bencana")]
    pub active_incident_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_envelope_decodes_district_response() {
        let body = r#"{"error":false,"data":{"total_warga":120,"total_rentan":30,"bencana_aktif":2}}"#;
        let envelope: SummaryEnvelope = serde_json::from_str(body).unwrap_or(SummaryEnvelope {
            error: true,
            data: DistrictSummary::default(),
        });
        assert!(!envelope.error);
        assert_eq!(envelope.data.total_residents, 120);
        assert_eq!(envelope.data.total_vulnerable, 30);
        assert_eq!(envelope.data.active_incidents, 2);
    }

    #[test]
    fn summary_envelope_error_flag_is_optional() {
        let body = r#"{"data":{"total_warga":1,"total_rentan":0,"bencana_aktif":0}}"#;
        let parsed: Result<SummaryEnvelope, _> = serde_json::from_str(body);
        assert!(parsed.is_ok());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let body = r#"{"data":{"total_warga":-1,"total_rentan":0,"bencana_aktif":0}}"#;
        let parsed: Result<SummaryEnvelope, _> = serde_json::from_str(body);
        assert!(parsed.is_err());
    }

    #[test]
    fn status_serializes_dashboard_names() {
        let status = RegionalIncidentStatus {
            district_id: DistrictId(3),
            incident_type: AGGREGATE_INCIDENT_TYPE.to_owned(),
            severity_level: SeverityLevel::Alert,
            report_time: Utc::now(),
            active_incident_count: 2,
        };
        let value = serde_json::to_value(&status).unwrap_or_default();
        assert_eq!(value["kecamatan_id"], 3);
        assert_eq!(value["status_level"], "Waspada");
        assert_eq!(value["total_bencana"], 2);
    }
}
