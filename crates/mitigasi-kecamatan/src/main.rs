//! District service entry point.
//!
//! Serves the district's `/summary` to the city, accepts incident and
//! resident reports, and publishes each accepted report to the broker so a
//! city running in `events` mode sees it without waiting for a poll.
//!
//! ```text
//! POST /bencana, /warga --> DistrictStore
//!                       \-> EventPublisher --queue--> worker --> JetStream  (in order, reported)
//! GET /summary <-- city polling synchronizer
//! ```

mod error;

use std::sync::Arc;
use std::time::Duration;

use mitigasi_api::{BroadcastHub, DistrictState, district_router, start_server};
use mitigasi_core::tasks::{DEFAULT_OUTCOME_CAPACITY, outcome_channel, spawn_reporter};
use mitigasi_core::{EventPublisher, OutcomeSender, ServiceConfig};
use mitigasi_db::{
    DatabaseTier, DistrictBackend, MemoryDistrictStore, PgDistrictStore, PostgresConfig,
    PostgresPool,
};
use mitigasi_types::DistrictId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::KecamatanError;

/// How long shutdown waits for queued publishes to drain.
const REPORTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application entry point.
#[tokio::main]
async fn main() -> Result<(), KecamatanError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("mitigasi-kecamatan starting");

    let config = ServiceConfig::load()?;
    let district_id = config.require_district_id()?;
    info!(%district_id, name = %config.district.name, "configuration loaded");

    let store = open_store(&config).await?;

    let hub = Arc::new(
        BroadcastHub::with_capacity(config.broadcast.queue_capacity)
            .with_heartbeat(config.broadcast.heartbeat()),
    );
    let (outcomes, reports) = outcome_channel(DEFAULT_OUTCOME_CAPACITY);
    let reporter = spawn_reporter(reports);

    let mut state = DistrictState::new(store, Arc::clone(&hub), district_id);
    if let Some(publisher) = connect_publisher(&config, district_id, outcomes).await {
        state = state.with_publisher(publisher);
    }

    // The publisher's worker stops once the router, and with it the last
    // publisher handle, is dropped; the reporter then sees every outcome.
    start_server(&config.server.bind_addr(), district_router(state), hub).await?;

    match tokio::time::timeout(REPORTER_DRAIN_TIMEOUT, reporter).await {
        Ok(Ok(tally)) => info!(
            published = tally.succeeded,
            failed = tally.failed,
            "Background publishes drained"
        ),
        Ok(Err(e)) => warn!(error = %e, "Outcome reporter panicked"),
        Err(_) => warn!("Gave up waiting for in-flight publishes"),
    }

    info!("mitigasi-kecamatan stopped");
    Ok(())
}

/// Open the district's `PostgreSQL` store, or fall back to memory when no
/// database is configured.
async fn open_store(config: &ServiceConfig) -> Result<DistrictBackend, KecamatanError> {
    if !config.infrastructure.has_database() {
        warn!("No database_url configured, residents and incidents are kept in memory only");
        return Ok(DistrictBackend::Memory(MemoryDistrictStore::new()));
    }

    let pool = PostgresPool::connect(
        &PostgresConfig::new(&config.infrastructure.database_url)
            .with_max_connections(config.infrastructure.database_max_connections),
    )
    .await?;
    pool.run_migrations(DatabaseTier::Kecamatan).await?;
    Ok(DistrictBackend::Postgres(PgDistrictStore::new(
        pool.pool().clone(),
    )))
}

/// Connect the event publisher. Reports are still accepted without one.
async fn connect_publisher(
    config: &ServiceConfig,
    district_id: DistrictId,
    outcomes: OutcomeSender,
) -> Option<EventPublisher> {
    if !config.infrastructure.has_broker() {
        warn!("No nats_url configured, events will not be published");
        return None;
    }

    let connected = match mitigasi_core::nats::connect(&config.infrastructure.nats_url).await {
        Ok(client) => EventPublisher::connect(client, &config.broker, district_id, outcomes).await,
        Err(e) => Err(e),
    };
    match connected {
        Ok(publisher) => {
            info!(topic = %config.broker.topic, "Event publisher ready");
            Some(publisher)
        }
        Err(e) => {
            warn!(error = %e, "Broker unavailable, events will not be published");
            None
        }
    }
}
