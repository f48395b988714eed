//! Synchronization core for the Mitigasi district/city services.
//!
//! Two producers keep the city's aggregate store current, and the city
//! binary runs exactly one of them:
//!
//! ```text
//! districts --GET /summary--> PollingSynchronizer --+
//!                                                    +--> AggregateStore
//! districts --EventPublisher--> JetStream --> EventSynchronizer --+
//! ```
//!
//! # Modules
//!
//! - [`config`] -- `mitigasi-config.yaml` loading, env overrides, validation
//! - [`polling`] -- Interval-driven pull of district summaries
//! - [`events`] -- Durable-consumer event synchronizer
//! - [`publisher`] -- District-side event publishing
//! - [`nats`] -- Broker connection and stream setup
//! - [`tasks`] -- Background tasks with reported outcomes
//! - [`error`] -- Shared error types

pub mod config;
pub mod error;
pub mod events;
pub mod nats;
pub mod polling;
pub mod publisher;
pub mod tasks;

pub use config::{ConfigError, ServiceConfig, SyncMode};
pub use error::CoreError;
pub use events::{
    APPLY_ATTEMPTS, Disposition, EventFeed, EventSynchronizer, FeedMessage, JetStreamFeed,
};
pub use polling::{CycleReport, DistrictFailure, FetchError, PollingOptions, PollingSynchronizer};
pub use publisher::{EventPublisher, EventSink, JetStreamSink};
pub use tasks::{OutcomeSender, TaskOutcome, spawn_reported};
