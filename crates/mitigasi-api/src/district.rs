//! District service endpoints.
//!
//! `GET /api/v1/summary` is what the city's polling synchronizer pulls.
//! The two report endpoints write to the district store and then queue the
//! change for the broker. Once the write has succeeded the request succeeds:
//! a failed publish is only reported on the outcome channel.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use mitigasi_db::{
    DistrictStore, IncidentRecord, IncidentScope, NewIncident, NewResident, ResidentRecord,
    VulnerabilityCategory,
};
use mitigasi_types::{SummaryEnvelope, SyncAction};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::error::ApiError;
use crate::state::DistrictState;

/// Body of `POST /api/v1/bencana`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IncidentReport {
    /// Kind of incident.
    #[serde(rename = "jenis_bencana")]
    #[validate(length(min = 1, max = 100))]
    pub incident_type: String,
    /// Reach of the incident.
    #[serde(rename = "level")]
    pub scope: IncidentScope,
    /// Free-form description.
    #[serde(rename = "deskripsi", default)]
    #[validate(length(max = 2000))]
    pub description: String,
}

impl From<IncidentReport> for NewIncident {
    fn from(report: IncidentReport) -> Self {
        Self {
            incident_type: report.incident_type,
            scope: report.scope,
            description: report.description,
        }
    }
}

/// Body of `POST /api/v1/warga`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResidentReport {
    /// National identity number.
    #[validate(length(min = 1, max = 32))]
    pub nik: String,
    /// Full name.
    #[serde(rename = "nama")]
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Vulnerability category.
    #[serde(rename = "kategori_rentan")]
    pub category: VulnerabilityCategory,
}

impl From<ResidentReport> for NewResident {
    fn from(report: ResidentReport) -> Self {
        Self {
            nik: report.nik,
            name: report.name,
            category: report.category,
        }
    }
}

/// Response of the report endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Created<T> {
    /// Always `false`.
    pub error: bool,
    /// What was stored.
    pub message: &'static str,
    /// The stored record.
    pub data: T,
}

/// `GET /api/v1/summary`
pub async fn summary(State(state): State<DistrictState>) -> Result<Json<SummaryEnvelope>, ApiError> {
    let summary = state.store.summary().await?;
    debug!(
        district_id = %state.district_id,
        total_residents = summary.total_residents,
        active_incidents = summary.active_incidents,
        "Summary served"
    );
    Ok(Json(SummaryEnvelope::ok(summary)))
}

/// `POST /api/v1/bencana`
pub async fn create_incident(
    State(state): State<DistrictState>,
    payload: Result<Json<IncidentReport>, JsonRejection>,
) -> Result<(StatusCode, Json<Created<IncidentRecord>>), ApiError> {
    let Json(report) = payload?;
    report.validate()?;

    let record = state.store.create_incident(&report.into()).await?;
    announce(&state, SyncAction::IncidentCreated, &record);

    Ok((
        StatusCode::CREATED,
        Json(Created {
            error: false,
            message: "Incident reported",
            data: record,
        }),
    ))
}

/// `POST /api/v1/warga`
pub async fn add_resident(
    State(state): State<DistrictState>,
    payload: Result<Json<ResidentReport>, JsonRejection>,
) -> Result<(StatusCode, Json<Created<ResidentRecord>>), ApiError> {
    let Json(report) = payload?;
    report.validate()?;

    let record = state.store.add_resident(&report.into()).await?;
    announce(&state, SyncAction::ResidentAdded, &record);

    Ok((
        StatusCode::CREATED,
        Json(Created {
            error: false,
            message: "Resident registered",
            data: record,
        }),
    ))
}

/// Hand the event to the publisher, if there is one.
fn announce<T: Serialize>(state: &DistrictState, action: SyncAction, record: &T) {
    match &state.publisher {
        Some(publisher) => publisher.publish(action, record),
        None => debug!(%action, "No broker configured, event not published"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn incident_report_uses_wire_names() {
        let report: IncidentReport = serde_json::from_str(
            r#"{"jenis_bencana":"Banjir","level":"Kecamatan","deskripsi":"Sungai meluap"}"#,
        )
        .unwrap();
        assert!(report.validate().is_ok());
        let incident = NewIncident::from(report);
        assert_eq!(incident.scope, IncidentScope::District);
        assert_eq!(incident.description, "Sungai meluap");
    }

    #[test]
    fn incident_description_is_optional() {
        let report: IncidentReport =
            serde_json::from_str(r#"{"jenis_bencana":"Longsor","level":"Lokal_RT"}"#).unwrap();
        assert!(report.description.is_empty());
        assert!(report.validate().is_ok());
    }

    #[test]
    fn unknown_scope_is_rejected_at_parse_time() {
        let parsed: Result<IncidentReport, _> =
            serde_json::from_str(r#"{"jenis_bencana":"Banjir","level":"Kota"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn resident_report_needs_a_name() {
        let report: ResidentReport = serde_json::from_str(
            r#"{"nik":"3201010101010001","nama":"","kategori_rentan":"Lansia"}"#,
        )
        .unwrap();
        assert!(report.validate().is_err());
    }
}
