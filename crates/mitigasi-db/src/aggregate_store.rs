//! The city's aggregate store: one recap row and one incident-status row
//! per district.
//!
//! [`AggregateStore`] is the single write contract shared by both
//! synchronizers. The polling path replaces a district's full snapshot
//! with [`AggregateStore::apply_summary`]; the event path applies
//! increments with [`AggregateStore::record_incident_created`] and
//! [`AggregateStore::record_resident_added`]. Every write targets one
//! `kecamatan_id` and is atomic: concurrent writers for the same district
//! serialize on the unique key, never on an application lock.
//!
//! # Tables
//!
//! ```text
//! rekap_data_wilayah       (kecamatan_id UNIQUE, total_warga, total_kerentanan, last_sync)
//! monitoring_bencana_kota  (kecamatan_id UNIQUE, jenis_bencana, status_level, waktu_laporan, total_bencana)
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mitigasi_types::{
    AGGREGATE_INCIDENT_TYPE, DistrictId, DistrictSummary, RegionalIncidentStatus, RegionalRecap,
    SeverityLevel, classify,
};
use sqlx::PgPool;

use crate::error::DbError;
use crate::memory::MemoryAggregateStore;
use crate::postgres::{MAX_COUNT, count_from_column, count_to_column};

/// Default cap on the number of status rows returned by a listing.
pub const DEFAULT_STATUS_LIMIT: u32 = 50;

/// Write and read operations on the aggregate tables.
///
/// Implemented by [`PgAggregateStore`] for production and
/// [`MemoryAggregateStore`] for tests and database-less development.
pub trait AggregateStore: Send + Sync {
    /// Insert or fully overwrite a district's recap row.
    fn upsert_recap(
        &self,
        recap: &RegionalRecap,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Insert or fully overwrite a district's incident-status row.
    fn upsert_incident_status(
        &self,
        status: &RegionalIncidentStatus,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Replace both rows of a district with one polled summary, atomically.
    ///
    /// Returns the rows as written.
    fn apply_summary(
        &self,
        district_id: DistrictId,
        summary: &DistrictSummary,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(RegionalRecap, RegionalIncidentStatus), DbError>> + Send;

    /// Count one new incident for a district.
    ///
    /// Creates the row with a count of 1 and [`SeverityLevel::Alert`] when
    /// absent, otherwise increments the count and re-derives the severity
    /// with [`classify`].
    fn record_incident_created(
        &self,
        district_id: DistrictId,
        incident_type: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<RegionalIncidentStatus, DbError>> + Send;

    /// Count one new resident for a district, creating the recap if absent.
    fn record_resident_added(
        &self,
        district_id: DistrictId,
        vulnerable: bool,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<RegionalRecap, DbError>> + Send;

    /// The recap of one district.
    fn recap(
        &self,
        district_id: DistrictId,
    ) -> impl Future<Output = Result<Option<RegionalRecap>, DbError>> + Send;

    /// All recaps, ordered by district id.
    fn recaps(&self) -> impl Future<Output = Result<Vec<RegionalRecap>, DbError>> + Send;

    /// The incident status of one district.
    fn incident_status(
        &self,
        district_id: DistrictId,
    ) -> impl Future<Output = Result<Option<RegionalIncidentStatus>, DbError>> + Send;

    /// Incident statuses, latest report first, at most `limit` rows.
    fn incident_statuses(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<RegionalIncidentStatus>, DbError>> + Send;
}

/// Build the two rows a polled summary maps to.
pub fn snapshot_rows(
    district_id: DistrictId,
    summary: &DistrictSummary,
    at: DateTime<Utc>,
) -> (RegionalRecap, RegionalIncidentStatus) {
    let recap = RegionalRecap {
        district_id,
        total_residents: summary.total_residents,
        total_vulnerable: summary.total_vulnerable,
        last_sync_time: at,
    };
    let status = RegionalIncidentStatus {
        district_id,
        incident_type: AGGREGATE_INCIDENT_TYPE.to_owned(),
        severity_level: classify(summary.active_incidents),
        report_time: at,
        active_incident_count: summary.active_incidents,
    };
    (recap, status)
}

impl<S: AggregateStore> AggregateStore for Arc<S> {
    fn upsert_recap(
        &self,
        recap: &RegionalRecap,
    ) -> impl Future<Output = Result<(), DbError>> + Send {
        (**self).upsert_recap(recap)
    }

    fn upsert_incident_status(
        &self,
        status: &RegionalIncidentStatus,
    ) -> impl Future<Output = Result<(), DbError>> + Send {
        (**self).upsert_incident_status(status)
    }

    fn apply_summary(
        &self,
        district_id: DistrictId,
        summary: &DistrictSummary,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(RegionalRecap, RegionalIncidentStatus), DbError>> + Send {
        (**self).apply_summary(district_id, summary, at)
    }

    fn record_incident_created(
        &self,
        district_id: DistrictId,
        incident_type: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<RegionalIncidentStatus, DbError>> + Send {
        (**self).record_incident_created(district_id, incident_type, at)
    }

    fn record_resident_added(
        &self,
        district_id: DistrictId,
        vulnerable: bool,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<RegionalRecap, DbError>> + Send {
        (**self).record_resident_added(district_id, vulnerable, at)
    }

    fn recap(
        &self,
        district_id: DistrictId,
    ) -> impl Future<Output = Result<Option<RegionalRecap>, DbError>> + Send {
        (**self).recap(district_id)
    }

    fn recaps(&self) -> impl Future<Output = Result<Vec<RegionalRecap>, DbError>> + Send {
        (**self).recaps()
    }

    fn incident_status(
        &self,
        district_id: DistrictId,
    ) -> impl Future<Output = Result<Option<RegionalIncidentStatus>, DbError>> + Send {
        (**self).incident_status(district_id)
    }

    fn incident_statuses(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<RegionalIncidentStatus>, DbError>> + Send {
        (**self).incident_statuses(limit)
    }
}

// =============================================================================
// PostgreSQL implementation
// =============================================================================

/// [`AggregateStore`] backed by the city's `PostgreSQL` database.
#[derive(Debug, Clone)]
pub struct PgAggregateStore {
    pool: PgPool,
}

impl PgAggregateStore {
    /// Create a store over a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_RECAP: &str = r"INSERT INTO rekap_data_wilayah
      (kecamatan_id, total_warga, total_kerentanan, last_sync)
      VALUES ($1, $2, $3, $4)
      ON CONFLICT (kecamatan_id) DO UPDATE SET
        total_warga = EXCLUDED.total_warga,
        total_kerentanan = EXCLUDED.total_kerentanan,
        last_sync = EXCLUDED.last_sync,
        updated_at = now()";

const UPSERT_STATUS: &str = r"INSERT INTO monitoring_bencana_kota
      (kecamatan_id, jenis_bencana, status_level, waktu_laporan, total_bencana)
      VALUES ($1, $2, $3, $4, $5)
      ON CONFLICT (kecamatan_id) DO UPDATE SET
        jenis_bencana = EXCLUDED.jenis_bencana,
        status_level = EXCLUDED.status_level,
        waktu_laporan = EXCLUDED.waktu_laporan,
        total_bencana = EXCLUDED.total_bencana,
        updated_at = now()";

fn bind_recap<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    recap: &RegionalRecap,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(recap.district_id.as_i64())
        .bind(count_to_column(recap.total_residents))
        .bind(count_to_column(recap.total_vulnerable))
        .bind(recap.last_sync_time)
}

fn bind_status<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    status: &'q RegionalIncidentStatus,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(status.district_id.as_i64())
        .bind(status.incident_type.as_str())
        .bind(status.severity_level.label())
        .bind(status.report_time)
        .bind(count_to_column(status.active_incident_count))
}

impl AggregateStore for PgAggregateStore {
    async fn upsert_recap(&self, recap: &RegionalRecap) -> Result<(), DbError> {
        bind_recap(sqlx::query(UPSERT_RECAP), recap)
            .execute(&self.pool)
            .await?;
        tracing::debug!(district_id = %recap.district_id, "Upserted recap");
        Ok(())
    }

    async fn upsert_incident_status(&self, status: &RegionalIncidentStatus) -> Result<(), DbError> {
        bind_status(sqlx::query(UPSERT_STATUS), status)
            .execute(&self.pool)
            .await?;
        tracing::debug!(district_id = %status.district_id, "Upserted incident status");
        Ok(())
    }

    async fn apply_summary(
        &self,
        district_id: DistrictId,
        summary: &DistrictSummary,
        at: DateTime<Utc>,
    ) -> Result<(RegionalRecap, RegionalIncidentStatus), DbError> {
        let (recap, status) = snapshot_rows(district_id, summary, at);

        let mut tx = self.pool.begin().await?;
        bind_recap(sqlx::query(UPSERT_RECAP), &recap)
            .execute(&mut *tx)
            .await?;
        bind_status(sqlx::query(UPSERT_STATUS), &status)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(%district_id, "Applied district summary");
        Ok((recap, status))
    }

    async fn record_incident_created(
        &self,
        district_id: DistrictId,
        incident_type: &str,
        at: DateTime<Utc>,
    ) -> Result<RegionalIncidentStatus, DbError> {
        let mut tx = self.pool.begin().await?;

        // The upsert takes the row lock; the severity update below runs
        // under it, so the count and level always come from the same write.
        let count: i64 = sqlx::query_scalar(
            r"INSERT INTO monitoring_bencana_kota AS m
              (kecamatan_id, jenis_bencana, status_level, waktu_laporan, total_bencana)
              VALUES ($1, $2, $3, $4, 1)
              ON CONFLICT (kecamatan_id) DO UPDATE SET
                jenis_bencana = EXCLUDED.jenis_bencana,
                waktu_laporan = EXCLUDED.waktu_laporan,
                total_bencana = LEAST(m.total_bencana + 1, $5),
                updated_at = now()
              RETURNING total_bencana",
        )
        .bind(district_id.as_i64())
        .bind(incident_type)
        .bind(SeverityLevel::Alert.label())
        .bind(at)
        .bind(MAX_COUNT)
        .fetch_one(&mut *tx)
        .await?;

        let active_incident_count = count_from_column(count, "total_bencana")?;
        let severity_level = classify(active_incident_count);

        sqlx::query(
            r"UPDATE monitoring_bencana_kota SET status_level = $2 WHERE kecamatan_id = $1",
        )
        .bind(district_id.as_i64())
        .bind(severity_level.label())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(%district_id, active_incident_count, %severity_level, "Counted new incident");
        Ok(RegionalIncidentStatus {
            district_id,
            incident_type: incident_type.to_owned(),
            severity_level,
            report_time: at,
            active_incident_count,
        })
    }

    async fn record_resident_added(
        &self,
        district_id: DistrictId,
        vulnerable: bool,
        at: DateTime<Utc>,
    ) -> Result<RegionalRecap, DbError> {
        let row = sqlx::query_as::<_, RecapRow>(
            r"INSERT INTO rekap_data_wilayah AS r
              (kecamatan_id, total_warga, total_kerentanan, last_sync)
              VALUES ($1, 1, $2, $3)
              ON CONFLICT (kecamatan_id) DO UPDATE SET
                total_warga = LEAST(r.total_warga + 1, $4),
                total_kerentanan = LEAST(r.total_kerentanan + EXCLUDED.total_kerentanan, $4),
                last_sync = EXCLUDED.last_sync,
                updated_at = now()
              RETURNING kecamatan_id, total_warga, total_kerentanan, last_sync",
        )
        .bind(district_id.as_i64())
        .bind(i64::from(vulnerable))
        .bind(at)
        .bind(MAX_COUNT)
        .fetch_one(&self.pool)
        .await?;

        RegionalRecap::try_from(row)
    }

    async fn recap(&self, district_id: DistrictId) -> Result<Option<RegionalRecap>, DbError> {
        let row = sqlx::query_as::<_, RecapRow>(
            r"SELECT kecamatan_id, total_warga, total_kerentanan, last_sync
              FROM rekap_data_wilayah
              WHERE kecamatan_id = $1",
        )
        .bind(district_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RegionalRecap::try_from).transpose()
    }

    async fn recaps(&self) -> Result<Vec<RegionalRecap>, DbError> {
        let rows = sqlx::query_as::<_, RecapRow>(
            r"SELECT kecamatan_id, total_warga, total_kerentanan, last_sync
              FROM rekap_data_wilayah
              ORDER BY kecamatan_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RegionalRecap::try_from).collect()
    }

    async fn incident_status(
        &self,
        district_id: DistrictId,
    ) -> Result<Option<RegionalIncidentStatus>, DbError> {
        let row = sqlx::query_as::<_, StatusRow>(
            r"SELECT kecamatan_id, jenis_bencana, status_level, waktu_laporan, total_bencana
              FROM monitoring_bencana_kota
              WHERE kecamatan_id = $1",
        )
        .bind(district_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RegionalIncidentStatus::try_from).transpose()
    }

    async fn incident_statuses(&self, limit: u32) -> Result<Vec<RegionalIncidentStatus>, DbError> {
        let rows = sqlx::query_as::<_, StatusRow>(
            r"SELECT kecamatan_id, jenis_bencana, status_level, waktu_laporan, total_bencana
              FROM monitoring_bencana_kota
              ORDER BY waktu_laporan DESC, kecamatan_id
              LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RegionalIncidentStatus::try_from).collect()
    }
}

/// A row from the `rekap_data_wilayah` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecapRow {
    /// District id.
    pub kecamatan_id: i64,
    /// Registered residents.
    pub total_warga: i64,
    /// Vulnerable residents.
    pub total_kerentanan: i64,
    /// Last write time.
    pub last_sync: DateTime<Utc>,
}

impl TryFrom<RecapRow> for RegionalRecap {
    type Error = DbError;

    fn try_from(row: RecapRow) -> Result<Self, Self::Error> {
        Ok(Self {
            district_id: district_from_column(row.kecamatan_id)?,
            total_residents: count_from_column(row.total_warga, "total_warga")?,
            total_vulnerable: count_from_column(row.total_kerentanan, "total_kerentanan")?,
            last_sync_time: row.last_sync,
        })
    }
}

/// A row from the `monitoring_bencana_kota` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusRow {
    /// District id.
    pub kecamatan_id: i64,
    /// Incident type of the latest report.
    pub jenis_bencana: String,
    /// Severity label.
    pub status_level: String,
    /// Last write time.
    pub waktu_laporan: DateTime<Utc>,
    /// Active incidents.
    pub total_bencana: i64,
}

impl TryFrom<StatusRow> for RegionalIncidentStatus {
    type Error = DbError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        let severity_level = SeverityLevel::from_label(&row.status_level)
            .ok_or_else(|| DbError::Decode(format!("unknown status_level {}", row.status_level)))?;
        Ok(Self {
            district_id: district_from_column(row.kecamatan_id)?,
            incident_type: row.jenis_bencana,
            severity_level,
            report_time: row.waktu_laporan,
            active_incident_count: count_from_column(row.total_bencana, "total_bencana")?,
        })
    }
}

fn district_from_column(value: i64) -> Result<DistrictId, DbError> {
    DistrictId::try_from(value).map_err(|e| DbError::Decode(format!("kecamatan_id = {value}: {e}")))
}

// =============================================================================
// Runtime-selected backend
// =============================================================================

/// An [`AggregateStore`] chosen at startup from configuration.
#[derive(Debug, Clone)]
pub enum AggregateBackend {
    /// The city's `PostgreSQL` database.
    Postgres(PgAggregateStore),
    /// Process-local tables (no database configured).
    Memory(MemoryAggregateStore),
}

impl AggregateStore for AggregateBackend {
    async fn upsert_recap(&self, recap: &RegionalRecap) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.upsert_recap(recap).await,
            Self::Memory(store) => store.upsert_recap(recap).await,
        }
    }

    async fn upsert_incident_status(&self, status: &RegionalIncidentStatus) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.upsert_incident_status(status).await,
            Self::Memory(store) => store.upsert_incident_status(status).await,
        }
    }

    async fn apply_summary(
        &self,
        district_id: DistrictId,
        summary: &DistrictSummary,
        at: DateTime<Utc>,
    ) -> Result<(RegionalRecap, RegionalIncidentStatus), DbError> {
        match self {
            Self::Postgres(store) => store.apply_summary(district_id, summary, at).await,
            Self::Memory(store) => store.apply_summary(district_id, summary, at).await,
        }
    }

    async fn record_incident_created(
        &self,
        district_id: DistrictId,
        incident_type: &str,
        at: DateTime<Utc>,
    ) -> Result<RegionalIncidentStatus, DbError> {
        match self {
            Self::Postgres(store) => {
                store
                    .record_incident_created(district_id, incident_type, at)
                    .await
            }
            Self::Memory(store) => {
                store
                    .record_incident_created(district_id, incident_type, at)
                    .await
            }
        }
    }

    async fn record_resident_added(
        &self,
        district_id: DistrictId,
        vulnerable: bool,
        at: DateTime<Utc>,
    ) -> Result<RegionalRecap, DbError> {
        match self {
            Self::Postgres(store) => store.record_resident_added(district_id, vulnerable, at).await,
            Self::Memory(store) => store.record_resident_added(district_id, vulnerable, at).await,
        }
    }

    async fn recap(&self, district_id: DistrictId) -> Result<Option<RegionalRecap>, DbError> {
        match self {
            Self::Postgres(store) => store.recap(district_id).await,
            Self::Memory(store) => store.recap(district_id).await,
        }
    }

    async fn recaps(&self) -> Result<Vec<RegionalRecap>, DbError> {
        match self {
            Self::Postgres(store) => store.recaps().await,
            Self::Memory(store) => store.recaps().await,
        }
    }

    async fn incident_status(
        &self,
        district_id: DistrictId,
    ) -> Result<Option<RegionalIncidentStatus>, DbError> {
        match self {
            Self::Postgres(store) => store.incident_status(district_id).await,
            Self::Memory(store) => store.incident_status(district_id).await,
        }
    }

    async fn incident_statuses(&self, limit: u32) -> Result<Vec<RegionalIncidentStatus>, DbError> {
        match self {
            Self::Postgres(store) => store.incident_statuses(limit).await,
            Self::Memory(store) => store.incident_statuses(limit).await,
        }
    }
}
