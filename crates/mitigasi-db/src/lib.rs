//! Data layer for the Mitigasi synchronization core.
//!
//! The city owns an aggregate database with one row per district in each of
//! two tables; every district owns a source database with its residents and
//! incidents. Both tiers have a `PostgreSQL` implementation and an in-memory
//! one with the same contract.
//!
//! # Architecture
//!
//! ```text
//! District service                 City service
//!     |                                |
//!     +-- DistrictStore                +-- AggregateStore
//!         |-- warga_rentan                 |-- rekap_data_wilayah
//!         +-- kejadian_bencana             +-- monitoring_bencana_kota
//!             |                                 ^
//!             +---- GET /summary  (polling) ----+
//!             +---- SyncEvent     (events)  ----+
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration and migrations
//! - [`aggregate_store`] -- City aggregate tables
//! - [`district_store`] -- District source tables
//! - [`memory`] -- In-memory implementations of both stores
//! - [`error`] -- Shared error types

pub mod aggregate_store;
pub mod district_store;
pub mod error;
pub mod memory;
pub mod postgres;

// Re-export primary types for convenience.
pub use aggregate_store::{
    AggregateBackend, AggregateStore, DEFAULT_STATUS_LIMIT, PgAggregateStore, RecapRow, StatusRow,
};
pub use district_store::{
    DistrictBackend, DistrictStore, IncidentRecord, IncidentScope, NewIncident, NewResident,
    PgDistrictStore, ResidentRecord, VulnerabilityCategory,
};
pub use error::DbError;
pub use memory::{MemoryAggregateStore, MemoryDistrictStore};
pub use postgres::{DatabaseTier, PostgresConfig, PostgresPool};
