//! HTTP surfaces of the Mitigasi city and district services.
//!
//! - **City**: aggregate read endpoints over the
//!   [`AggregateStore`](mitigasi_db::AggregateStore) that the synchronizers
//!   keep current.
//! - **District**: the `/summary` endpoint the city polls, plus incident
//!   and resident reports that are published as broker events.
//! - **Both**: the emergency broadcast, a Server-Sent Events stream fed by
//!   a [`BroadcastHub`] of bounded per-client queues.
//!
//! # Architecture
//!
//! ```text
//! POST /notifikasi/darurat --> BroadcastHub --try_send--> client queue --> pump --> SSE
//!                                   ^                                       |
//!                                   +------------- ClientGuard (drop) ------+
//! ```

pub mod district;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod router;
pub mod server;
pub mod state;
pub mod stream;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use hub::{BroadcastHub, BroadcastReport, ClientGuard};
pub use router::{broadcast_routes, city_router, district_router};
pub use server::{ServerError, serve, start_server};
pub use state::{CityState, DistrictState};
