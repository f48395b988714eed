//! Polling synchronizer: pull every district's summary on a fixed interval.
//!
//! Each cycle requests `GET {base_url}/summary` from every configured
//! district (at most `max_concurrent_requests` in flight) and replaces the
//! district's two aggregate rows with the result. A district that fails in
//! any way is logged and counted; it never stops the cycle or touches
//! another district's rows.
//!
//! ```text
//! tick --> [district 1] --GET /summary--> apply_summary --+
//!      --> [district 2] --timeout-------> failure --------+--> CycleReport
//!      --> [district 3] --GET /summary--> apply_summary --+
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use mitigasi_db::{AggregateStore, DbError};
use mitigasi_types::{DistrictId, DistrictSummary, SummaryEnvelope};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::{DistrictEndpoint, SyncConfig};
use crate::error::CoreError;

/// Timing and fan-out of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingOptions {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Districts fetched concurrently.
    pub max_concurrent_requests: usize,
}

impl From<&SyncConfig> for PollingOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: config.interval(),
            request_timeout: config.request_timeout(),
            max_concurrent_requests: config.max_concurrent_requests,
        }
    }
}

/// Why one district could not be synchronized.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure.
    #[error("request failed: {0}")]
    Request(reqwest::Error),

    /// The district answered with a non-200 status.
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    /// The body was not a summary envelope.
    #[error("malformed summary: {0}")]
    Decode(String),

    /// The envelope carried `error: true`.
    #[error("district reported an error")]
    Flagged,

    /// Writing the aggregate rows failed.
    #[error("store write failed: {0}")]
    Store(#[from] DbError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err)
        }
    }
}

/// A district that failed within a cycle.
#[derive(Debug)]
pub struct DistrictFailure {
    /// The failing district.
    pub district_id: DistrictId,
    /// Its display name.
    pub name: String,
    /// What went wrong.
    pub error: FetchError,
}

/// Outcome of one polling cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Districts whose rows were written.
    pub succeeded: usize,
    /// Districts that failed.
    pub failed: usize,
    /// Failure details, ordered by district id.
    pub failures: Vec<DistrictFailure>,
}

/// Periodically pulls summaries into an [`AggregateStore`].
#[derive(Debug)]
pub struct PollingSynchronizer<S> {
    store: S,
    client: reqwest::Client,
    districts: Vec<DistrictEndpoint>,
    options: PollingOptions,
}

impl<S: AggregateStore> PollingSynchronizer<S> {
    /// Build a synchronizer over `districts`, visited in the given order.
    pub fn new(
        store: S,
        districts: Vec<DistrictEndpoint>,
        options: PollingOptions,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            store,
            client,
            districts,
            options,
        })
    }

    /// Build a synchronizer from the `sync` configuration section.
    pub fn from_config(store: S, config: &SyncConfig) -> Result<Self, CoreError> {
        Self::new(store, config.districts.clone(), PollingOptions::from(config))
    }

    /// The store being written.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Request one district's summary.
    pub async fn fetch_summary(
        &self,
        district: &DistrictEndpoint,
    ) -> Result<DistrictSummary, FetchError> {
        let response = self.client.get(district.summary_url()).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let envelope: SummaryEnvelope = response.json().await?;
        if envelope.error {
            return Err(FetchError::Flagged);
        }
        Ok(envelope.data)
    }

    async fn sync_district(
        &self,
        district: &DistrictEndpoint,
        now: DateTime<Utc>,
    ) -> Result<(), DistrictFailure> {
        let outcome = async {
            let summary = self.fetch_summary(district).await?;
            self.store.apply_summary(district.id, &summary, now).await?;
            Ok::<_, FetchError>(summary)
        }
        .await;

        match outcome {
            Ok(summary) => {
                info!(
                    district_id = %district.id,
                    district = %district.name,
                    total_residents = summary.total_residents,
                    active_incidents = summary.active_incidents,
                    "District synchronized"
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    district_id = %district.id,
                    district = %district.name,
                    url = %district.summary_url(),
                    %error,
                    "District synchronization failed"
                );
                Err(DistrictFailure {
                    district_id: district.id,
                    name: district.name.clone(),
                    error,
                })
            }
        }
    }

    /// Run one cycle, stamping every written row with `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let results: Vec<Result<(), DistrictFailure>> = futures::stream::iter(&self.districts)
            .map(|district| self.sync_district(district, now))
            .buffer_unordered(self.options.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut report = CycleReport::default();
        for result in results {
            match result {
                Ok(()) => report.succeeded = report.succeeded.saturating_add(1),
                Err(failure) => {
                    report.failed = report.failed.saturating_add(1);
                    report.failures.push(failure);
                }
            }
        }
        report.failures.sort_by_key(|f| f.district_id);

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Polling cycle complete"
        );
        report
    }

    /// Run one cycle stamped with the current time.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run a cycle immediately, then one per interval, forever.
    pub async fn run(&self) {
        info!(
            districts = self.districts.len(),
            interval_secs = self.options.interval.as_secs(),
            "Polling synchronizer started"
        );
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use chrono::Duration as ChronoDuration;
    use mitigasi_db::MemoryAggregateStore;
    use mitigasi_types::SeverityLevel;
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/api/v1")
    }

    fn summary_router(summary: DistrictSummary) -> Router {
        Router::new().route(
            "/api/v1/summary",
            get(move || async move { Json(SummaryEnvelope::ok(summary)) }),
        )
    }

    fn slow_router() -> Router {
        Router::new().route(
            "/api/v1/summary",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(SummaryEnvelope::ok(DistrictSummary::default()))
            }),
        )
    }

    fn endpoint(id: u32, base_url: String) -> DistrictEndpoint {
        DistrictEndpoint {
            id: DistrictId(id),
            name: format!("Kecamatan {id}"),
            base_url,
        }
    }

    fn options() -> PollingOptions {
        PollingOptions {
            interval: Duration::from_secs(60),
            request_timeout: Duration::from_millis(300),
            max_concurrent_requests: 4,
        }
    }

    fn summary(residents: u32, vulnerable: u32, active: u32) -> DistrictSummary {
        DistrictSummary {
            total_residents: residents,
            total_vulnerable: vulnerable,
            active_incidents: active,
        }
    }

    #[tokio::test]
    async fn slow_district_fails_alone() {
        let a = serve(summary_router(summary(100, 20, 1))).await;
        let b = serve(slow_router()).await;
        let c = serve(summary_router(summary(80, 8, 6))).await;

        let store = MemoryAggregateStore::new();
        let sync = PollingSynchronizer::new(
            store.clone(),
            vec![endpoint(1, a), endpoint(2, b), endpoint(3, c)],
            options(),
        )
        .unwrap();

        let report = sync.run_cycle().await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures.len(), 1);
        let failure = report.failures.first().unwrap();
        assert_eq!(failure.district_id, DistrictId(2));
        assert!(matches!(failure.error, FetchError::Timeout));

        let recap_a = store.recap(DistrictId(1)).await.unwrap().unwrap();
        assert_eq!(recap_a.total_residents, 100);
        let status_c = store.incident_status(DistrictId(3)).await.unwrap().unwrap();
        assert_eq!(status_c.severity_level, SeverityLevel::Critical);
        assert!(store.recap(DistrictId(2)).await.unwrap().is_none());
        assert!(store.incident_status(DistrictId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_decode_and_connection_failures_are_counted() {
        let erroring = serve(Router::new().route(
            "/api/v1/summary",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let garbage = serve(Router::new().route(
            "/api/v1/summary",
            get(|| async { "not json" }),
        ))
        .await;
        let flagged = serve(Router::new().route(
            "/api/v1/summary",
            get(|| async {
                Json(SummaryEnvelope {
                    error: true,
                    data: DistrictSummary::default(),
                })
            }),
        ))
        .await;

        // Bind and drop to get a port nothing listens on.
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };

        let store = MemoryAggregateStore::new();
        let sync = PollingSynchronizer::new(
            store.clone(),
            vec![
                endpoint(1, erroring),
                endpoint(2, garbage),
                endpoint(3, flagged),
                endpoint(4, closed),
            ],
            options(),
        )
        .unwrap();

        let report = sync.run_cycle().await;
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 4);
        let errors: Vec<&FetchError> = report.failures.iter().map(|f| &f.error).collect();
        assert!(matches!(errors.first(), Some(FetchError::Status(s)) if s.as_u16() == 500));
        assert!(matches!(errors.get(1), Some(FetchError::Decode(_))));
        assert!(matches!(errors.get(2), Some(FetchError::Flagged)));
        assert!(matches!(errors.get(3), Some(FetchError::Request(_))));
        assert!(store.recaps().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_sync_increases_across_cycles() {
        let a = serve(summary_router(summary(10, 1, 0))).await;
        let store = MemoryAggregateStore::new();
        let sync =
            PollingSynchronizer::new(store.clone(), vec![endpoint(1, a)], options()).unwrap();

        let first = Utc::now();
        let second = first + ChronoDuration::minutes(5);
        sync.run_cycle_at(first).await;
        let before = store.recap(DistrictId(1)).await.unwrap().unwrap();
        sync.run_cycle_at(second).await;
        let after = store.recap(DistrictId(1)).await.unwrap().unwrap();

        assert!(after.last_sync_time > before.last_sync_time);
        assert_eq!(store.recaps().await.unwrap().len(), 1);
        let status = store.incident_status(DistrictId(1)).await.unwrap().unwrap();
        assert_eq!(status.severity_level, SeverityLevel::Calm);
        assert_eq!(status.report_time, second);
    }

    #[tokio::test]
    async fn empty_district_list_yields_empty_report() {
        let sync =
            PollingSynchronizer::new(MemoryAggregateStore::new(), Vec::new(), options()).unwrap();
        let report = sync.run_cycle().await;
        assert_eq!((report.succeeded, report.failed), (0, 0));
    }

    #[test]
    fn options_follow_sync_config() {
        let config = SyncConfig::default();
        let options = PollingOptions::from(&config);
        assert_eq!(options.interval, Duration::from_secs(300));
        assert_eq!(options.request_timeout, Duration::from_secs(5));
        assert_eq!(options.max_concurrent_requests, 4);
    }
}
