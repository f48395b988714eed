//! Event synchronizer: apply district events to the aggregate store as
//! they arrive.
//!
//! Events are read one at a time, in delivery order, from an [`EventFeed`],
//! and the next event is not read until the current one is settled:
//!
//! | Outcome                    | Ack? | Effect                               |
//! |----------------------------|------|--------------------------------------|
//! | applied                    | yes  | aggregate row incremented            |
//! | unknown action             | yes  | logged, nothing written              |
//! | undecodable payload        | yes  | logged, discarded, never retried     |
//! | store error while applying | no   | retried in place with backoff        |
//!
//! An event that still fails after [`APPLY_ATTEMPTS`] tries stops
//! [`EventSynchronizer::run`] with [`CoreError::Stalled`]. It stays
//! unacknowledged, so the broker redelivers it ahead of everything after
//! it. A failure to read from the feed itself (connection lost, stream
//! closed) ends the loop with a transport error.

use std::future::Future;
use std::time::Duration;

use async_nats::jetstream;
use async_nats::jetstream::consumer::{AckPolicy, PullConsumer, pull};
use chrono::Utc;
use futures::StreamExt;
use mitigasi_db::{AggregateStore, DbError};
use mitigasi_types::{AGGREGATE_INCIDENT_TYPE, NON_VULNERABLE_CATEGORY, SyncAction, SyncEvent};
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::error::CoreError;
use crate::nats::ensure_stream;

/// Tries made to apply one event before the synchronizer stops.
pub const APPLY_ATTEMPTS: u32 = 5;

/// Delay before the first retry. Doubles per retry up to [`MAX_APPLY_BACKOFF`].
pub const APPLY_BACKOFF: Duration = Duration::from_millis(200);

/// Longest delay between two tries.
pub const MAX_APPLY_BACKOFF: Duration = Duration::from_secs(5);

/// One delivered message.
pub trait FeedMessage: Send {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// Acknowledge the message so it is not redelivered.
    fn ack(self) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// An ordered, blocking source of event messages.
pub trait EventFeed: Send {
    /// Message type yielded by this feed.
    type Message: FeedMessage;

    /// Wait for the next message.
    ///
    /// Errors are transport-level and end the consumer loop.
    fn next_message(&mut self) -> impl Future<Output = Result<Self::Message, CoreError>> + Send;
}

// =============================================================================
// JetStream feed
// =============================================================================

/// A message from the JetStream durable consumer.
pub struct JetStreamMessage(jetstream::Message);

impl FeedMessage for JetStreamMessage {
    fn payload(&self) -> &[u8] {
        &self.0.payload
    }

    async fn ack(self) -> Result<(), CoreError> {
        self.0
            .ack()
            .await
            .map_err(|e| CoreError::Transport(format!("ack failed: {e}")))
    }
}

/// [`EventFeed`] over a durable JetStream pull consumer.
pub struct JetStreamFeed {
    messages: pull::Stream,
}

impl JetStreamFeed {
    /// Bind to the durable consumer named by `broker.consumer_group`,
    /// creating the stream and consumer if needed.
    pub async fn subscribe(
        client: async_nats::Client,
        broker: &BrokerConfig,
    ) -> Result<Self, CoreError> {
        let context = jetstream::new(client);
        let stream = ensure_stream(&context, broker).await?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &broker.consumer_group,
                pull::Config {
                    durable_name: Some(broker.consumer_group.clone()),
                    filter_subject: broker.subject_filter(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                CoreError::Transport(format!(
                    "failed to bind consumer {}: {e}",
                    broker.consumer_group
                ))
            })?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| CoreError::Transport(format!("failed to open message stream: {e}")))?;

        info!(
            consumer_group = %broker.consumer_group,
            subjects = %broker.subject_filter(),
            "Subscribed to district events"
        );
        Ok(Self { messages })
    }
}

impl EventFeed for JetStreamFeed {
    type Message = JetStreamMessage;

    async fn next_message(&mut self) -> Result<JetStreamMessage, CoreError> {
        match self.messages.next().await {
            Some(Ok(message)) => Ok(JetStreamMessage(message)),
            Some(Err(e)) => Err(CoreError::Transport(format!("event read failed: {e}"))),
            None => Err(CoreError::StreamClosed),
        }
    }
}

impl std::fmt::Debug for JetStreamFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamFeed").finish_non_exhaustive()
    }
}

// =============================================================================
// Synchronizer
// =============================================================================

/// How one message was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Written to the store and acknowledged.
    Applied,
    /// Unknown action; acknowledged without writing.
    Ignored,
    /// Undecodable payload; acknowledged and dropped.
    Discarded,
}

/// Consumes district events and applies them to an [`AggregateStore`].
#[derive(Debug)]
pub struct EventSynchronizer<S, F> {
    store: S,
    feed: F,
}

impl<S: AggregateStore, F: EventFeed> EventSynchronizer<S, F> {
    /// Create a synchronizer reading from `feed`.
    pub const fn new(store: S, feed: F) -> Self {
        Self { store, feed }
    }

    /// Process events until the feed fails or an event cannot be applied.
    pub async fn run(mut self) -> Result<(), CoreError> {
        info!("Event synchronizer started");
        loop {
            let message = match self.feed.next_message().await {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Event feed failed, stopping synchronizer");
                    return Err(e);
                }
            };
            if let Err(e) = self.handle(message).await {
                error!(error = %e, "Stopping synchronizer so the event is redelivered first");
                return Err(e);
            }
        }
    }

    /// Decode, apply and acknowledge one message.
    ///
    /// A store error is retried here, with backoff, before this returns.
    /// `Err` means the retries ran out and the message was not acknowledged.
    pub async fn handle(&self, message: F::Message) -> Result<Disposition, CoreError> {
        let event: SyncEvent = match serde_json::from_slice(message.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, bytes = message.payload().len(), "Discarding undecodable event");
                acknowledge(message).await;
                return Ok(Disposition::Discarded);
            }
        };

        let mut attempt: u32 = 1;
        let mut backoff = APPLY_BACKOFF;
        let applied = loop {
            match self.apply(&event).await {
                Ok(applied) => break applied,
                Err(e) if attempt < APPLY_ATTEMPTS => {
                    warn!(
                        action = %event.action,
                        district_id = %event.district_id,
                        attempt,
                        retry_in = ?backoff,
                        error = %e,
                        "Failed to apply event, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(MAX_APPLY_BACKOFF);
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => {
                    error!(
                        action = %event.action,
                        district_id = %event.district_id,
                        attempts = attempt,
                        error = %e,
                        "Event still failing, leaving it unacknowledged"
                    );
                    return Err(CoreError::Stalled {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        };

        acknowledge(message).await;
        Ok(if applied {
            Disposition::Applied
        } else {
            Disposition::Ignored
        })
    }

    /// Write one event's effect. Returns `false` for unknown actions.
    async fn apply(&self, event: &SyncEvent) -> Result<bool, DbError> {
        let now = Utc::now();
        match &event.action {
            SyncAction::IncidentCreated => {
                let incident_type = event
                    .payload_str("jenis_bencana")
                    .filter(|t| !t.is_empty())
                    .unwrap_or(AGGREGATE_INCIDENT_TYPE);
                let status = self
                    .store
                    .record_incident_created(event.district_id, incident_type, now)
                    .await?;
                info!(
                    district_id = %event.district_id,
                    incident_type = incident_type,
                    active_incidents = status.active_incident_count,
                    severity = %status.severity_level,
                    "Incident event applied"
                );
                Ok(true)
            }
            SyncAction::ResidentAdded => {
                let vulnerable = event
                    .payload_str("kategori_rentan")
                    .is_some_and(|c| c != NON_VULNERABLE_CATEGORY);
                let recap = self
                    .store
                    .record_resident_added(event.district_id, vulnerable, now)
                    .await?;
                info!(
                    district_id = %event.district_id,
                    total_residents = recap.total_residents,
                    total_vulnerable = recap.total_vulnerable,
                    "Resident event applied"
                );
                Ok(true)
            }
            SyncAction::Other(action) => {
                info!(action = %action, district_id = %event.district_id, "Ignoring unknown event action");
                Ok(false)
            }
        }
    }
}

async fn acknowledge<M: FeedMessage>(message: M) {
    match message.ack().await {
        Ok(()) => debug!("Event acknowledged"),
        Err(e) => warn!(error = %e, "Failed to acknowledge event"),
    }
}
