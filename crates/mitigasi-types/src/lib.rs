//! Shared type definitions for the Mitigasi synchronization core.
//!
//! This crate is the single source of truth for the data that crosses
//! process boundaries: district summaries pulled by the city, aggregate rows
//! served to the dashboard, events on the broker topic, and emergency
//! broadcasts. Dashboard-facing types are exported to `TypeScript` via
//! `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- District ids and UUID-backed local identifiers
//! - [`severity`] -- [`SeverityLevel`] and the [`classify`] function
//! - [`structs`] -- Summary and aggregate row types
//! - [`events`] -- Broker event payloads
//! - [`broadcast`] -- Emergency broadcast payload

pub mod broadcast;
pub mod events;
pub mod ids;
pub mod severity;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use broadcast::BroadcastMessage;
pub use events::{SyncAction, SyncEvent};
pub use ids::{ClientId, DistrictId, IncidentId, ResidentId};
pub use severity::{SeverityLevel, classify};
pub use structs::{
    AGGREGATE_INCIDENT_TYPE, DistrictSummary, NON_VULNERABLE_CATEGORY, RegionalIncidentStatus,
    RegionalRecap, SummaryEnvelope,
};
