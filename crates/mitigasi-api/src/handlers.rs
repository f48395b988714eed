//! City aggregate read endpoints.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness |
//! | `GET` | `/api/v1/monitoring/kota` | Latest statuses, all recaps, city totals |
//! | `GET` | `/api/v1/monitoring/kecamatan/{id}` | Status and recap of one district |
//! | `GET` | `/api/v1/monitoring/rekap/{kecamatan_id}` | Recap of one district |
//! | `GET` | `/api/v1/monitoring/statistik` | All recaps with totals |

use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use mitigasi_db::{AggregateStore, DEFAULT_STATUS_LIMIT};
use mitigasi_types::{DistrictId, RegionalIncidentStatus, RegionalRecap};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::CityState;

/// Success envelope shared by every read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    /// Always `false`.
    pub error: bool,
    /// The payload.
    pub data: T,
}

impl<T> Envelope<T> {
    /// Wrap a payload.
    pub const fn ok(data: T) -> Json<Self> {
        Json(Self { error: false, data })
    }
}

/// Totals over a set of districts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CityTotals {
    /// Registered residents.
    #[serde(rename = "total_warga")]
    pub total_residents: u64,
    /// Vulnerable residents.
    #[serde(rename = "total_kerentanan")]
    pub total_vulnerable: u64,
    /// Active incidents.
    #[serde(rename = "active_bencana_count")]
    pub active_incidents: u64,
}

impl CityTotals {
    /// Sum recaps and statuses, saturating.
    pub fn sum(recaps: &[RegionalRecap], statuses: &[RegionalIncidentStatus]) -> Self {
        let mut totals = Self::default();
        for recap in recaps {
            totals.total_residents = totals
                .total_residents
                .saturating_add(u64::from(recap.total_residents));
            totals.total_vulnerable = totals
                .total_vulnerable
                .saturating_add(u64::from(recap.total_vulnerable));
        }
        for status in statuses {
            totals.active_incidents = totals
                .active_incidents
                .saturating_add(u64::from(status.active_incident_count));
        }
        totals
    }
}

/// Data of `GET /api/v1/monitoring/kota`.
#[derive(Debug, Clone, Serialize)]
pub struct CityOverview {
    /// Latest statuses, most recent report first.
    pub monitoring: Vec<RegionalIncidentStatus>,
    /// Every district's recap.
    pub rekap_kecamatan: Vec<RegionalRecap>,
    /// City-wide totals.
    #[serde(flatten)]
    pub totals: CityTotals,
}

/// Data of `GET /api/v1/monitoring/kecamatan/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct DistrictMonitoring {
    /// The district's latest status, if any was synchronized.
    pub bencana_monitoring: Option<RegionalIncidentStatus>,
    /// The district's recap, if any was synchronized.
    pub rekap_wilayah: Option<RegionalRecap>,
}

/// Data of `GET /api/v1/monitoring/rekap/{kecamatan_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RecapData {
    /// The district's recap.
    pub rekap: RegionalRecap,
}

/// Data of `GET /api/v1/monitoring/statistik`.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    /// Every district's recap.
    pub rekap_kecamatan: Vec<RegionalRecap>,
    /// Number of districts with a recap.
    pub total_kecamatan: usize,
    /// Registered residents.
    #[serde(rename = "total_warga")]
    pub total_residents: u64,
    /// Vulnerable totals.
    #[serde(rename = "total_kerentanan")]
    pub total_vulnerable: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Always `ok`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /api/v1/monitoring/kota`
pub async fn city_overview(
    State(state): State<CityState>,
) -> Result<Json<Envelope<CityOverview>>, ApiError> {
    let monitoring = state.store.incident_statuses(DEFAULT_STATUS_LIMIT).await?;
    let rekap_kecamatan = state.store.recaps().await?;
    let totals = CityTotals::sum(&rekap_kecamatan, &monitoring);
    Ok(Envelope::ok(CityOverview {
        monitoring,
        rekap_kecamatan,
        totals,
    }))
}

/// `GET /api/v1/monitoring/kecamatan/{id}`
pub async fn district_monitoring(
    State(state): State<CityState>,
    path: Result<Path<u32>, PathRejection>,
) -> Result<Json<Envelope<DistrictMonitoring>>, ApiError> {
    let Path(id) = path?;
    let district_id = DistrictId(id);
    let bencana_monitoring = state.store.incident_status(district_id).await?;
    let rekap_wilayah = state.store.recap(district_id).await?;
    Ok(Envelope::ok(DistrictMonitoring {
        bencana_monitoring,
        rekap_wilayah,
    }))
}

/// `GET /api/v1/monitoring/rekap/{kecamatan_id}`
pub async fn recap(
    State(state): State<CityState>,
    path: Result<Path<u32>, PathRejection>,
) -> Result<Json<Envelope<RecapData>>, ApiError> {
    let Path(id) = path?;
    let rekap = state
        .store
        .recap(DistrictId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no recap for district {id}")))?;
    Ok(Envelope::ok(RecapData { rekap }))
}

/// `GET /api/v1/monitoring/statistik`
pub async fn statistics(
    State(state): State<CityState>,
) -> Result<Json<Envelope<Statistics>>, ApiError> {
    let recaps = state.store.recaps().await?;
    let totals = CityTotals::sum(&recaps, &[]);
    Ok(Envelope::ok(Statistics {
        total_kecamatan: recaps.len(),
        rekap_kecamatan: recaps,
        total_residents: totals.total_residents,
        total_vulnerable: totals.total_vulnerable,
    }))
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use chrono::Utc;
    use mitigasi_types::SeverityLevel;

    use super::*;

    fn recap_row(id: u32, residents: u32, vulnerable: u32) -> RegionalRecap {
        RegionalRecap {
            district_id: DistrictId(id),
            total_residents: residents,
            total_vulnerable: vulnerable,
            last_sync_time: Utc::now(),
        }
    }

    fn status_row(id: u32, active: u32) -> RegionalIncidentStatus {
        RegionalIncidentStatus {
            district_id: DistrictId(id),
            incident_type: "Banjir".to_owned(),
            severity_level: SeverityLevel::Alert,
            report_time: Utc::now(),
            active_incident_count: active,
        }
    }

    #[test]
    fn totals_add_up_every_district() {
        let totals = CityTotals::sum(
            &[recap_row(1, 100, 20), recap_row(2, 50, 5)],
            &[status_row(1, 2), status_row(2, 3)],
        );
        assert_eq!(
            totals,
            CityTotals {
                total_residents: 150,
                total_vulnerable: 25,
                active_incidents: 5,
            }
        );
    }

    #[test]
    fn totals_do_not_overflow() {
        let totals = CityTotals::sum(
            &[recap_row(1, u32::MAX, 0), recap_row(2, u32::MAX, 0)],
            &[],
        );
        assert_eq!(totals.total_residents, u64::from(u32::MAX) * 2);
    }
}
