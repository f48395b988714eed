//! A district's own source tables: registered residents and reported
//! incidents.
//!
//! The district service computes its [`DistrictSummary`] from these tables
//! and writes to them when residents or incidents are reported. The city
//! never reads them directly.

use std::future::Future;

use chrono::{DateTime, Utc};
use mitigasi_types::{DistrictSummary, IncidentId, NON_VULNERABLE_CATEGORY, ResidentId};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::DbError;
use crate::memory::MemoryDistrictStore;
use crate::postgres::count_from_column;

/// Incident status that counts towards `bencana_aktif`.
pub const ACTIVE_STATUS: &str = "Aktif";

/// How far an incident reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentScope {
    /// Confined to one neighbourhood unit.
    #[serde(rename = "Lokal_RT")]
    Neighbourhood,
    /// Affects the whole district.
    #[serde(rename = "Kecamatan")]
    District,
}

impl IncidentScope {
    /// The stored label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Neighbourhood => "Lokal_RT",
            Self::District => "Kecamatan",
        }
    }

    /// Parse a stored label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Lokal_RT" => Some(Self::Neighbourhood),
            "Kecamatan" => Some(Self::District),
            _ => None,
        }
    }
}

/// Resident vulnerability categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulnerabilityCategory {
    /// `Lansia`.
    #[serde(rename = "Lansia")]
    Elderly,
    /// `Disabilitas`.
    #[serde(rename = "Disabilitas")]
    Disabled,
    /// `Anak-anak`.
    #[serde(rename = "Anak-anak")]
    Child,
    /// `Ibu Hamil`.
    #[serde(rename = "Ibu Hamil")]
    Pregnant,
    /// `Sakit Keras`.
    #[serde(rename = "Sakit Keras")]
    SeriouslyIll,
    /// `Non-Rentan`.
    #[serde(rename = "Non-Rentan")]
    NotVulnerable,
}

impl VulnerabilityCategory {
    /// The stored label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Elderly => "Lansia",
            Self::Disabled => "Disabilitas",
            Self::Child => "Anak-anak",
            Self::Pregnant => "Ibu Hamil",
            Self::SeriouslyIll => "Sakit Keras",
            Self::NotVulnerable => NON_VULNERABLE_CATEGORY,
        }
    }

    /// Whether residents in this category count as vulnerable.
    pub const fn is_vulnerable(self) -> bool {
        !matches!(self, Self::NotVulnerable)
    }

    /// Parse a stored label.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            Self::Elderly,
            Self::Disabled,
            Self::Child,
            Self::Pregnant,
            Self::SeriouslyIll,
            Self::NotVulnerable,
        ]
        .into_iter()
        .find(|c| c.label() == label)
    }
}

/// A newly reported incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
    /// Kind of incident (`Banjir`, `Longsor`, ...).
    #[serde(rename = "jenis_bencana")]
    pub incident_type: String,
    /// Reach of the incident.
    #[serde(rename = "level")]
    pub scope: IncidentScope,
    /// Free-form description.
    #[serde(rename = "deskripsi", default)]
    pub description: String,
}

/// A stored incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Local identifier.
    pub id: IncidentId,
    /// Kind of incident.
    #[serde(rename = "jenis_bencana")]
    pub incident_type: String,
    /// Reach of the incident.
    #[serde(rename = "level")]
    pub scope: IncidentScope,
    /// `Aktif` or `Selesai`.
    pub status: String,
    /// Free-form description.
    #[serde(rename = "deskripsi")]
    pub description: String,
    /// When the incident started.
    #[serde(rename = "waktu_mulai")]
    pub started_at: DateTime<Utc>,
    /// When the incident was closed.
    #[serde(rename = "waktu_selesai")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl IncidentRecord {
    /// A fresh, active record for a report.
    pub fn open(incident: &NewIncident, at: DateTime<Utc>) -> Self {
        Self {
            id: IncidentId::new(),
            incident_type: incident.incident_type.clone(),
            scope: incident.scope,
            status: ACTIVE_STATUS.to_owned(),
            description: incident.description.clone(),
            started_at: at,
            ended_at: None,
        }
    }

    /// Whether the incident counts towards `bencana_aktif`.
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}

/// A newly registered resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResident {
    /// National identity number (unique).
    pub nik: String,
    /// Full name.
    #[serde(rename = "nama")]
    pub name: String,
    /// Vulnerability category.
    #[serde(rename = "kategori_rentan")]
    pub category: VulnerabilityCategory,
}

/// A stored resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentRecord {
    /// Local identifier.
    pub id: ResidentId,
    /// National identity number.
    pub nik: String,
    /// Full name.
    #[serde(rename = "nama")]
    pub name: String,
    /// Vulnerability category.
    #[serde(rename = "kategori_rentan")]
    pub category: VulnerabilityCategory,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl ResidentRecord {
    /// A fresh record for a registration.
    pub fn register(resident: &NewResident, at: DateTime<Utc>) -> Self {
        Self {
            id: ResidentId::new(),
            nik: resident.nik.clone(),
            name: resident.name.clone(),
            category: resident.category,
            created_at: at,
        }
    }
}

/// Operations on a district's source tables.
pub trait DistrictStore: Send + Sync {
    /// Compute the district's current totals.
    fn summary(&self) -> impl Future<Output = Result<DistrictSummary, DbError>> + Send;

    /// Store a new, active incident.
    fn create_incident(
        &self,
        incident: &NewIncident,
    ) -> impl Future<Output = Result<IncidentRecord, DbError>> + Send;

    /// Register a resident.
    ///
    /// Returns [`DbError::Conflict`] if the NIK is already registered.
    fn add_resident(
        &self,
        resident: &NewResident,
    ) -> impl Future<Output = Result<ResidentRecord, DbError>> + Send;
}

/// [`DistrictStore`] backed by the district's `PostgreSQL` database.
#[derive(Debug, Clone)]
pub struct PgDistrictStore {
    pool: PgPool,
}

impl PgDistrictStore {
    /// Create a store over a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    total_warga: i64,
    total_rentan: i64,
    bencana_aktif: i64,
}

impl DistrictStore for PgDistrictStore {
    async fn summary(&self) -> Result<DistrictSummary, DbError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r"SELECT
                (SELECT COUNT(*) FROM warga_rentan) AS total_warga,
                (SELECT COUNT(*) FROM warga_rentan WHERE kategori_rentan <> $1) AS total_rentan,
                (SELECT COUNT(*) FROM kejadian_bencana WHERE status = $2) AS bencana_aktif",
        )
        .bind(NON_VULNERABLE_CATEGORY)
        .bind(ACTIVE_STATUS)
        .fetch_one(&self.pool)
        .await?;

        Ok(DistrictSummary {
            total_residents: count_from_column(row.total_warga, "total_warga")?,
            total_vulnerable: count_from_column(row.total_rentan, "total_rentan")?,
            active_incidents: count_from_column(row.bencana_aktif, "bencana_aktif")?,
        })
    }

    async fn create_incident(&self, incident: &NewIncident) -> Result<IncidentRecord, DbError> {
        let record = IncidentRecord::open(incident, Utc::now());
        sqlx::query(
            r"INSERT INTO kejadian_bencana
              (id, jenis_bencana, level, status, deskripsi, waktu_mulai)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id.into_inner())
        .bind(&record.incident_type)
        .bind(record.scope.label())
        .bind(&record.status)
        .bind(&record.description)
        .bind(record.started_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(incident_id = %record.id, incident_type = %record.incident_type, "Incident recorded");
        Ok(record)
    }

    async fn add_resident(&self, resident: &NewResident) -> Result<ResidentRecord, DbError> {
        let record = ResidentRecord::register(resident, Utc::now());
        sqlx::query(
            r"INSERT INTO warga_rentan (id, nik, nama, kategori_rentan, created_at)
              VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id.into_inner())
        .bind(&record.nik)
        .bind(&record.name)
        .bind(record.category.label())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, "resident NIK"))?;

        tracing::info!(resident_id = %record.id, category = record.category.label(), "Resident registered");
        Ok(record)
    }
}

/// A [`DistrictStore`] chosen at startup from configuration.
#[derive(Debug, Clone)]
pub enum DistrictBackend {
    /// The district's `PostgreSQL` database.
    Postgres(PgDistrictStore),
    /// Process-local tables (no database configured).
    Memory(MemoryDistrictStore),
}

impl DistrictStore for DistrictBackend {
    async fn summary(&self) -> Result<DistrictSummary, DbError> {
        match self {
            Self::Postgres(store) => store.summary().await,
            Self::Memory(store) => store.summary().await,
        }
    }

    async fn create_incident(&self, incident: &NewIncident) -> Result<IncidentRecord, DbError> {
        match self {
            Self::Postgres(store) => store.create_incident(incident).await,
            Self::Memory(store) => store.create_incident(incident).await,
        }
    }

    async fn add_resident(&self, resident: &NewResident) -> Result<ResidentRecord, DbError> {
        match self {
            Self::Postgres(store) => store.add_resident(resident).await,
            Self::Memory(store) => store.add_resident(resident).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_round_trip_through_labels() {
        for label in ["Lansia", "Disabilitas", "Anak-anak", "Ibu Hamil", "Sakit Keras", "Non-Rentan"] {
            let category = VulnerabilityCategory::from_label(label);
            assert!(matches!(category, Some(c) if c.label() == label));
        }
        assert!(VulnerabilityCategory::from_label("Remaja").is_none());
    }

    #[test]
    fn only_non_rentan_is_not_vulnerable() {
        assert!(!VulnerabilityCategory::NotVulnerable.is_vulnerable());
        assert!(VulnerabilityCategory::Elderly.is_vulnerable());
        assert!(VulnerabilityCategory::Pregnant.is_vulnerable());
    }

    #[test]
    fn new_incident_decodes_report_body() {
        let body = r#"{"jenis_bencana":"Banjir","level":"Lokal_RT"}"#;
        let incident: NewIncident = serde_json::from_str(body).unwrap_or(NewIncident {
            incident_type: String::new(),
            scope: IncidentScope::District,
            description: String::from("unparsed"),
        });
        assert_eq!(incident.incident_type, "Banjir");
        assert_eq!(incident.scope, IncidentScope::Neighbourhood);
        assert!(incident.description.is_empty());
    }

    #[test]
    fn opened_incident_is_active() {
        let incident = NewIncident {
            incident_type: String::from("Longsor"),
            scope: IncidentScope::from_label("Kecamatan").unwrap_or(IncidentScope::Neighbourhood),
            description: String::new(),
        };
        let record = IncidentRecord::open(&incident, Utc::now());
        assert!(record.is_active());
        assert_eq!(record.scope, IncidentScope::District);
        assert!(record.ended_at.is_none());
    }
}
