//! Process-local stores for tests and database-less development.
//!
//! Each store keeps its tables behind one [`tokio::sync::RwLock`], so a
//! read-modify-write holds the write guard for its whole duration and
//! per-district writes never interleave.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mitigasi_types::{
    DistrictId, DistrictSummary, RegionalIncidentStatus, RegionalRecap, SeverityLevel, classify,
};
use tokio::sync::RwLock;

use crate::aggregate_store::{AggregateStore, snapshot_rows};
use crate::district_store::{
    DistrictStore, IncidentRecord, NewIncident, NewResident, ResidentRecord,
};
use crate::error::DbError;

#[derive(Debug, Default)]
struct AggregateTables {
    recaps: BTreeMap<DistrictId, RegionalRecap>,
    statuses: BTreeMap<DistrictId, RegionalIncidentStatus>,
}

/// In-memory [`AggregateStore`]. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryAggregateStore {
    tables: Arc<RwLock<AggregateTables>>,
}

impl MemoryAggregateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateStore for MemoryAggregateStore {
    async fn upsert_recap(&self, recap: &RegionalRecap) -> Result<(), DbError> {
        self.tables
            .write()
            .await
            .recaps
            .insert(recap.district_id, recap.clone());
        Ok(())
    }

    async fn upsert_incident_status(&self, status: &RegionalIncidentStatus) -> Result<(), DbError> {
        self.tables
            .write()
            .await
            .statuses
            .insert(status.district_id, status.clone());
        Ok(())
    }

    async fn apply_summary(
        &self,
        district_id: DistrictId,
        summary: &DistrictSummary,
        at: DateTime<Utc>,
    ) -> Result<(RegionalRecap, RegionalIncidentStatus), DbError> {
        let (recap, status) = snapshot_rows(district_id, summary, at);
        let mut tables = self.tables.write().await;
        tables.recaps.insert(district_id, recap.clone());
        tables.statuses.insert(district_id, status.clone());
        Ok((recap, status))
    }

    async fn record_incident_created(
        &self,
        district_id: DistrictId,
        incident_type: &str,
        at: DateTime<Utc>,
    ) -> Result<RegionalIncidentStatus, DbError> {
        let mut tables = self.tables.write().await;
        let status = tables
            .statuses
            .entry(district_id)
            .and_modify(|s| {
                s.active_incident_count = s.active_incident_count.saturating_add(1);
                s.severity_level = classify(s.active_incident_count);
                incident_type.clone_into(&mut s.incident_type);
                s.report_time = at;
            })
            .or_insert_with(|| RegionalIncidentStatus {
                district_id,
                incident_type: incident_type.to_owned(),
                severity_level: SeverityLevel::Alert,
                report_time: at,
                active_incident_count: 1,
            });
        Ok(status.clone())
    }

    async fn record_resident_added(
        &self,
        district_id: DistrictId,
        vulnerable: bool,
        at: DateTime<Utc>,
    ) -> Result<RegionalRecap, DbError> {
        let mut tables = self.tables.write().await;
        let recap = tables
            .recaps
            .entry(district_id)
            .or_insert_with(|| RegionalRecap {
                district_id,
                total_residents: 0,
                total_vulnerable: 0,
                last_sync_time: at,
            });
        recap.total_residents = recap.total_residents.saturating_add(1);
        if vulnerable {
            recap.total_vulnerable = recap.total_vulnerable.saturating_add(1);
        }
        recap.last_sync_time = at;
        Ok(recap.clone())
    }

    async fn recap(&self, district_id: DistrictId) -> Result<Option<RegionalRecap>, DbError> {
        Ok(self.tables.read().await.recaps.get(&district_id).cloned())
    }

    async fn recaps(&self) -> Result<Vec<RegionalRecap>, DbError> {
        Ok(self.tables.read().await.recaps.values().cloned().collect())
    }

    async fn incident_status(
        &self,
        district_id: DistrictId,
    ) -> Result<Option<RegionalIncidentStatus>, DbError> {
        Ok(self.tables.read().await.statuses.get(&district_id).cloned())
    }

    async fn incident_statuses(&self, limit: u32) -> Result<Vec<RegionalIncidentStatus>, DbError> {
        let mut statuses: Vec<_> = self.tables.read().await.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| {
            b.report_time
                .cmp(&a.report_time)
                .then(a.district_id.cmp(&b.district_id))
        });
        statuses.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(statuses)
    }
}

#[derive(Debug, Default)]
struct DistrictTables {
    residents: Vec<ResidentRecord>,
    niks: HashSet<String>,
    incidents: Vec<IncidentRecord>,
}

/// In-memory [`DistrictStore`]. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDistrictStore {
    tables: Arc<RwLock<DistrictTables>>,
}

impl MemoryDistrictStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl DistrictStore for MemoryDistrictStore {
    async fn summary(&self) -> Result<DistrictSummary, DbError> {
        let tables = self.tables.read().await;
        Ok(DistrictSummary {
            total_residents: saturating_count(tables.residents.len()),
            total_vulnerable: saturating_count(
                tables
                    .residents
                    .iter()
                    .filter(|r| r.category.is_vulnerable())
                    .count(),
            ),
            active_incidents: saturating_count(
                tables.incidents.iter().filter(|i| i.is_active()).count(),
            ),
        })
    }

    async fn create_incident(&self, incident: &NewIncident) -> Result<IncidentRecord, DbError> {
        let record = IncidentRecord::open(incident, Utc::now());
        self.tables.write().await.incidents.push(record.clone());
        Ok(record)
    }

    async fn add_resident(&self, resident: &NewResident) -> Result<ResidentRecord, DbError> {
        let mut tables = self.tables.write().await;
        if !tables.niks.insert(resident.nik.clone()) {
            return Err(DbError::Conflict(String::from("resident NIK already exists")));
        }
        let record = ResidentRecord::register(resident, Utc::now());
        tables.residents.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::district_store::{IncidentScope, VulnerabilityCategory};

    fn summary(residents: u32, vulnerable: u32, active: u32) -> DistrictSummary {
        DistrictSummary {
            total_residents: residents,
            total_vulnerable: vulnerable,
            active_incidents: active,
        }
    }

    #[tokio::test]
    async fn apply_summary_twice_keeps_one_row_with_latest_values() {
        let store = MemoryAggregateStore::new();
        let first = Utc::now();
        let second = first + Duration::seconds(60);

        store
            .apply_summary(DistrictId(1), &summary(100, 10, 0), first)
            .await
            .unwrap();
        store
            .apply_summary(DistrictId(1), &summary(120, 12, 3), second)
            .await
            .unwrap();

        let recaps = store.recaps().await.unwrap();
        assert_eq!(recaps.len(), 1);
        assert_eq!(recaps[0].total_residents, 120);
        assert_eq!(recaps[0].last_sync_time, second);

        let status = store.incident_status(DistrictId(1)).await.unwrap().unwrap();
        assert_eq!(status.active_incident_count, 3);
        assert_eq!(status.severity_level, SeverityLevel::Standby);
    }

    #[tokio::test]
    async fn upserts_are_idempotent_and_overwrite_in_place() {
        let store = MemoryAggregateStore::new();
        let at = Utc::now();
        let recap = RegionalRecap {
            district_id: DistrictId(8),
            total_residents: 70,
            total_vulnerable: 9,
            last_sync_time: at,
        };
        store.upsert_recap(&recap).await.unwrap();
        store.upsert_recap(&recap).await.unwrap();
        assert_eq!(store.recaps().await.unwrap(), vec![recap.clone()]);

        let updated = RegionalRecap {
            total_residents: 75,
            last_sync_time: at + Duration::seconds(5),
            ..recap
        };
        store.upsert_recap(&updated).await.unwrap();
        assert_eq!(store.recaps().await.unwrap(), vec![updated]);

        let status = RegionalIncidentStatus {
            district_id: DistrictId(8),
            incident_type: String::from("Banjir"),
            severity_level: SeverityLevel::Alert,
            report_time: at,
            active_incident_count: 2,
        };
        store.upsert_incident_status(&status).await.unwrap();
        store.upsert_incident_status(&status).await.unwrap();
        assert_eq!(store.incident_statuses(50).await.unwrap(), vec![status.clone()]);

        let escalated = RegionalIncidentStatus {
            severity_level: SeverityLevel::Critical,
            active_incident_count: 6,
            ..status
        };
        store.upsert_incident_status(&escalated).await.unwrap();
        assert_eq!(
            store.incident_status(DistrictId(8)).await.unwrap(),
            Some(escalated)
        );
        assert_eq!(store.incident_statuses(50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn incident_created_starts_at_alert_then_reclassifies() {
        let store = MemoryAggregateStore::new();
        let at = Utc::now();

        let first = store
            .record_incident_created(DistrictId(4), "Banjir", at)
            .await
            .unwrap();
        assert_eq!(first.active_incident_count, 1);
        assert_eq!(first.severity_level, SeverityLevel::Alert);

        let second = store
            .record_incident_created(DistrictId(4), "Longsor", at)
            .await
            .unwrap();
        assert_eq!(second.active_incident_count, 2);
        assert_eq!(second.severity_level, classify(2));
        assert_eq!(second.incident_type, "Longsor");

        let third = store
            .record_incident_created(DistrictId(4), "Longsor", at)
            .await
            .unwrap();
        assert_eq!(third.severity_level, SeverityLevel::Standby);
    }

    #[tokio::test]
    async fn incident_created_leaves_other_districts_untouched() {
        let store = MemoryAggregateStore::new();
        let at = Utc::now();
        store
            .apply_summary(DistrictId(2), &summary(50, 5, 6), at)
            .await
            .unwrap();

        store
            .record_incident_created(DistrictId(3), "Banjir", at)
            .await
            .unwrap();

        let untouched = store.incident_status(DistrictId(2)).await.unwrap().unwrap();
        assert_eq!(untouched.active_incident_count, 6);
        assert_eq!(untouched.severity_level, SeverityLevel::Critical);
    }

    #[tokio::test]
    async fn resident_added_creates_then_increments() {
        let store = MemoryAggregateStore::new();
        let at = Utc::now();

        let recap = store
            .record_resident_added(DistrictId(7), true, at)
            .await
            .unwrap();
        assert_eq!((recap.total_residents, recap.total_vulnerable), (1, 1));

        let recap = store
            .record_resident_added(DistrictId(7), false, at)
            .await
            .unwrap();
        assert_eq!((recap.total_residents, recap.total_vulnerable), (2, 1));
    }

    #[tokio::test]
    async fn statuses_are_listed_latest_first_and_capped() {
        let store = MemoryAggregateStore::new();
        let base = Utc::now();
        for id in 1..=5 {
            let at = base + Duration::seconds(i64::from(id));
            store
                .apply_summary(DistrictId(id), &summary(1, 0, 1), at)
                .await
                .unwrap();
        }

        let listed = store.incident_statuses(3).await.unwrap();
        let ids: Vec<u32> = listed.iter().map(|s| s.district_id.get()).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn district_summary_counts_vulnerable_and_active() {
        let store = MemoryDistrictStore::new();
        for (nik, category) in [
            ("3201", VulnerabilityCategory::Elderly),
            ("3202", VulnerabilityCategory::NotVulnerable),
            ("3203", VulnerabilityCategory::Child),
        ] {
            store
                .add_resident(&NewResident {
                    nik: nik.to_owned(),
                    name: String::from("Warga"),
                    category,
                })
                .await
                .unwrap();
        }
        store
            .create_incident(&NewIncident {
                incident_type: String::from("Banjir"),
                scope: IncidentScope::Neighbourhood,
                description: String::new(),
            })
            .await
            .unwrap();

        let totals = store.summary().await.unwrap();
        assert_eq!(totals, summary(3, 2, 1));
    }

    #[tokio::test]
    async fn duplicate_nik_is_a_conflict() {
        let store = MemoryDistrictStore::new();
        let resident = NewResident {
            nik: String::from("3201"),
            name: String::from("Siti"),
            category: VulnerabilityCategory::Pregnant,
        };
        store.add_resident(&resident).await.unwrap();
        assert!(matches!(
            store.add_resident(&resident).await,
            Err(DbError::Conflict(_))
        ));
        assert_eq!(store.summary().await.unwrap().total_residents, 1);
    }
}
