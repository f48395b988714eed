//! Shared application state for the two services.
//!
//! Both states hold the [`BroadcastHub`] so the broadcast routes can be
//! mounted on either router; [`FromRef`] lets those handlers extract just
//! the hub.

use std::sync::Arc;

use axum::extract::FromRef;
use mitigasi_core::EventPublisher;
use mitigasi_db::{AggregateBackend, DistrictBackend};
use mitigasi_types::DistrictId;

use crate::hub::BroadcastHub;

/// State of the city service.
#[derive(Debug, Clone, FromRef)]
pub struct CityState {
    /// Aggregate tables written by the synchronizer.
    pub store: AggregateBackend,
    /// Streaming clients.
    pub hub: Arc<BroadcastHub>,
}

impl CityState {
    /// Create the city state.
    pub const fn new(store: AggregateBackend, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }
}

/// State of a district service.
#[derive(Debug, Clone, FromRef)]
pub struct DistrictState {
    /// The district's residents and incidents.
    pub store: DistrictBackend,
    /// Streaming clients.
    pub hub: Arc<BroadcastHub>,
    /// Event publisher; `None` when no broker is configured. Its worker
    /// reports every publish on the outcome channel.
    pub publisher: Option<EventPublisher>,
    /// This district.
    pub district_id: DistrictId,
}

impl DistrictState {
    /// Create the district state without a publisher.
    pub const fn new(store: DistrictBackend, hub: Arc<BroadcastHub>, district_id: DistrictId) -> Self {
        Self {
            store,
            hub,
            publisher: None,
            district_id,
        }
    }

    /// Attach an event publisher.
    #[must_use]
    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }
}
