//! Axum router construction for both services.
//!
//! The broadcast routes are generic over the state so that the city and
//! district routers can each mount them. CORS allows any origin for the
//! dashboard; every request is traced.

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::district;
use crate::handlers;
use crate::hub::BroadcastHub;
use crate::state::{CityState, DistrictState};
use crate::stream;

/// Routes of the emergency broadcast:
///
/// - `GET /api/v1/broadcast/stream` -- Server-Sent Events stream
/// - `POST /api/v1/notifikasi/darurat` -- multicast an alert
pub fn broadcast_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<BroadcastHub>: FromRef<S>,
{
    Router::new()
        .route("/api/v1/broadcast/stream", get(stream::broadcast_stream))
        .route("/api/v1/notifikasi/darurat", post(stream::send_emergency))
}

/// Build the city router.
///
/// - `GET /health`
/// - `GET /api/v1/monitoring/kota`
/// - `GET /api/v1/monitoring/kecamatan/{id}`
/// - `GET /api/v1/monitoring/rekap/{kecamatan_id}`
/// - `GET /api/v1/monitoring/statistik`
/// - the [`broadcast_routes`]
pub fn city_router(state: CityState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/monitoring/kota", get(handlers::city_overview))
        .route(
            "/api/v1/monitoring/kecamatan/{id}",
            get(handlers::district_monitoring),
        )
        .route(
            "/api/v1/monitoring/rekap/{kecamatan_id}",
            get(handlers::recap),
        )
        .route("/api/v1/monitoring/statistik", get(handlers::statistics))
        .merge(broadcast_routes())
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the district router.
///
/// - `GET /health`
/// - `GET /api/v1/summary`
/// - `POST /api/v1/bencana`
/// - `POST /api/v1/warga`
/// - the [`broadcast_routes`]
pub fn district_router(state: DistrictState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/summary", get(district::summary))
        .route("/api/v1/bencana", post(district::create_incident))
        .route("/api/v1/warga", post(district::add_resident))
        .merge(broadcast_routes())
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
