//! Emergency broadcast endpoints.
//!
//! - `GET /api/v1/broadcast/stream` -- Server-Sent Events. One `connected`
//!   event, then an `alert` for every broadcast and a `heartbeat` after
//!   each stretch of silence.
//! - `POST /api/v1/notifikasi/darurat` -- multicast an alert to every open
//!   stream.
//!
//! Each stream is fed by its own pump task that selects over the client's
//! queue, the heartbeat timer, the closing of the response body and the
//! hub's shutdown signal. The pump owns the [`ClientGuard`], so it
//! unregisters on every exit path.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, Sse};
use chrono::{DateTime, Utc};
use mitigasi_types::{BroadcastMessage, ClientId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use validator::Validate;

use crate::error::ApiError;
use crate::hub::{BroadcastHub, BroadcastReport, ClientGuard};

/// Stream event sent once, when the connection opens.
pub const CONNECTED_EVENT: &str = "connected";
/// Stream event carrying a [`BroadcastMessage`].
pub const ALERT_EVENT: &str = "alert";
/// Stream event sent after a heartbeat interval without alerts.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// A stream of server-sent events.
pub type EventStream = ReceiverStream<Result<Event, Infallible>>;

/// Data of the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedNotice {
    /// The id assigned to this connection.
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    /// Human-readable greeting.
    pub message: String,
}

/// Data of the `heartbeat` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// When the heartbeat was sent.
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/v1/notifikasi/darurat`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmergencyRequest {
    /// Kind of incident.
    #[serde(rename = "jenis_bencana")]
    #[validate(length(min = 1, max = 100))]
    pub incident_type: String,
    /// Severity or scope label.
    #[serde(rename = "level")]
    #[validate(length(min = 1, max = 50))]
    pub severity: String,
    /// Message for residents.
    #[serde(rename = "pesan")]
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

/// Response data of an emergency broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyResponse {
    /// Always `false`.
    pub error: bool,
    /// The message as it was multicast.
    pub data: BroadcastMessage,
    /// How many clients received it.
    pub report: BroadcastReport,
}

/// `GET /api/v1/broadcast/stream`
pub async fn broadcast_stream(State(hub): State<Arc<BroadcastHub>>) -> Sse<EventStream> {
    let (client_id, queue) = hub.register();
    let guard = ClientGuard::new(Arc::clone(&hub), client_id);
    let (out, body) = mpsc::channel(1);
    tokio::spawn(pump(guard, queue, out, hub.heartbeat()));
    Sse::new(ReceiverStream::new(body))
}

/// `POST /api/v1/notifikasi/darurat`
pub async fn send_emergency(
    State(hub): State<Arc<BroadcastHub>>,
    payload: Result<Json<EmergencyRequest>, JsonRejection>,
) -> Result<Json<EmergencyResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let message = BroadcastMessage::new(request.incident_type, request.severity, request.message);
    let report = hub.broadcast(&message);
    Ok(Json(EmergencyResponse {
        error: false,
        data: message,
        report,
    }))
}

/// Feed one client's stream until the client goes away or the hub closes.
///
/// Alerts are forwarded in queue order as soon as they arrive. The
/// heartbeat timer restarts after every alert, so a heartbeat is only sent
/// after `heartbeat` of silence.
pub async fn pump(
    guard: ClientGuard,
    mut queue: mpsc::Receiver<BroadcastMessage>,
    out: mpsc::Sender<Result<Event, Infallible>>,
    heartbeat: Duration,
) {
    let client_id = guard.client_id();
    let mut closing = guard.hub().closed_signal();
    if *closing.borrow() {
        debug!(%client_id, "Hub closed, stream not started");
        return;
    }
    if out.send(Ok(connected_event(client_id))).await.is_err() {
        return;
    }

    let mut ticker = interval(heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();

    loop {
        let event = tokio::select! {
            () = out.closed() => break,
            _ = closing.changed() => break,
            received = queue.recv() => {
                let Some(message) = received else { break };
                ticker.reset();
                alert_event(&message)
            }
            _ = ticker.tick() => heartbeat_event(Utc::now()),
        };

        if out.send(Ok(event)).await.is_err() {
            break;
        }
    }

    debug!(%client_id, "Broadcast stream closed");
    drop(guard);
}

/// The `connected` event for a client.
pub fn connected_event(client_id: ClientId) -> Event {
    let notice = ConnectedNotice {
        client_id,
        message: "Connected to broadcast stream".to_owned(),
    };
    to_event(CONNECTED_EVENT, &notice)
}

/// The `alert` event for a message.
pub fn alert_event(message: &BroadcastMessage) -> Event {
    to_event(ALERT_EVENT, message)
}

/// The `heartbeat` event for a point in time.
pub fn heartbeat_event(timestamp: DateTime<Utc>) -> Event {
    to_event(HEARTBEAT_EVENT, &Heartbeat { timestamp })
}

/// An event with JSON data; an unencodable payload yields a data-less event.
fn to_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| {
            warn!(event = name, error = %e, "Failed to encode stream event");
            Event::default().event(name)
        })
}
