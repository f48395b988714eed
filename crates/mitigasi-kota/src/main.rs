//! City service entry point.
//!
//! Keeps the city's aggregate tables current from the districts and serves
//! them to the dashboard, together with the emergency broadcast stream.
//!
//! # Architecture
//!
//! ```text
//!                 +-- polling: GET {district}/summary every interval --+
//! sync.mode ------+                                                    +--> AggregateStore --> HTTP API
//!                 +-- events:  JetStream durable consumer -------------+
//! ```
//!
//! The HTTP server and the selected synchronizer run side by side. `Ctrl-C`
//! closes open broadcast streams, stops the server and the process exits
//! cleanly. In `events` mode, losing the broker or an event that keeps
//! failing to apply ends the process with an error.

mod error;

use std::sync::Arc;

use mitigasi_api::{BroadcastHub, CityState, city_router, start_server};
use mitigasi_core::{EventSynchronizer, JetStreamFeed, PollingSynchronizer, ServiceConfig, SyncMode};
use mitigasi_db::{
    AggregateBackend, DatabaseTier, MemoryAggregateStore, PgAggregateStore, PostgresConfig,
    PostgresPool,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::KotaError;

/// Application entry point.
///
/// Initializes logging, loads configuration, opens the aggregate store,
/// then runs the HTTP server and the configured synchronizer until either
/// stops.
#[tokio::main]
async fn main() -> Result<(), KotaError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("mitigasi-kota starting");

    let config = ServiceConfig::load()?;
    info!(
        mode = ?config.sync.mode,
        districts = config.sync.districts.len(),
        interval_minutes = config.sync.interval_minutes,
        "configuration loaded"
    );

    let store = open_store(&config).await?;

    let hub = Arc::new(
        BroadcastHub::with_capacity(config.broadcast.queue_capacity)
            .with_heartbeat(config.broadcast.heartbeat()),
    );
    let router = city_router(CityState::new(store.clone(), Arc::clone(&hub)));
    let bind_addr = config.server.bind_addr();

    tokio::select! {
        result = start_server(&bind_addr, router, hub) => {
            result?;
            info!("mitigasi-kota stopped");
            Ok(())
        }
        result = synchronize(store, &config) => {
            if let Err(e) = &result {
                error!(error = %e, "Synchronizer stopped");
            }
            result
        }
    }
}

/// Open the `PostgreSQL` aggregate store, or fall back to memory when no
/// database is configured.
async fn open_store(config: &ServiceConfig) -> Result<AggregateBackend, KotaError> {
    if !config.infrastructure.has_database() {
        warn!("No database_url configured, aggregates are kept in memory only");
        return Ok(AggregateBackend::Memory(MemoryAggregateStore::new()));
    }

    let pool = PostgresPool::connect(
        &PostgresConfig::new(&config.infrastructure.database_url)
            .with_max_connections(config.infrastructure.database_max_connections),
    )
    .await?;
    pool.run_migrations(DatabaseTier::Kota).await?;
    Ok(AggregateBackend::Postgres(PgAggregateStore::new(
        pool.pool().clone(),
    )))
}

/// Run the synchronizer selected by `sync.mode`.
async fn synchronize(store: AggregateBackend, config: &ServiceConfig) -> Result<(), KotaError> {
    match config.sync.mode {
        SyncMode::Polling => {
            let synchronizer = PollingSynchronizer::from_config(store, &config.sync)?;
            synchronizer.run().await;
            Ok(())
        }
        SyncMode::Events => {
            let client = mitigasi_core::nats::connect(&config.infrastructure.nats_url).await?;
            let feed = JetStreamFeed::subscribe(client, &config.broker).await?;
            EventSynchronizer::new(store, feed).run().await?;
            Ok(())
        }
    }
}
