//! Event publisher: a district announces its changes on the broker topic.
//!
//! Events are keyed by action: each goes to the subject `{topic}.{action}`.
//! [`EventPublisher::publish`] only queues the event. One worker task sends
//! queued events in order and waits for each broker acknowledgement before
//! sending the next, so the broker receives a district's events in the order
//! its mutations happened. Every result, including an event that could not
//! be queued, is reported on the outcome channel; none of them fails the
//! request that triggered it.

use std::convert::Infallible;
use std::future::Future;

use async_nats::jetstream;
use mitigasi_types::{DistrictId, SyncAction, SyncEvent};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::error::CoreError;
use crate::nats::ensure_stream;
use crate::tasks::{OutcomeSender, report, report_now, spawn_reported};

/// Default number of events that may wait for the worker.
pub const DEFAULT_PUBLISH_QUEUE: usize = 256;

/// The subject an action is published to.
pub fn subject_for(topic: &str, action: &SyncAction) -> String {
    format!("{topic}.{}", action.as_str())
}

fn publish_label(action: &SyncAction) -> String {
    format!("publish {action}")
}

/// Where the publisher's worker delivers events.
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event, resolving once the broker has accepted it.
    fn send(&self, event: &SyncEvent) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// [`EventSink`] appending to the JetStream stream.
#[derive(Clone)]
pub struct JetStreamSink {
    context: jetstream::Context,
    topic: String,
}

impl JetStreamSink {
    /// Open a sink on `broker.topic`, ensuring the stream exists.
    pub async fn connect(client: async_nats::Client, broker: &BrokerConfig) -> Result<Self, CoreError> {
        let context = jetstream::new(client);
        ensure_stream(&context, broker).await?;
        Ok(Self {
            context,
            topic: broker.topic.clone(),
        })
    }
}

impl EventSink for JetStreamSink {
    async fn send(&self, event: &SyncEvent) -> Result<(), CoreError> {
        let subject = subject_for(&self.topic, &event.action);
        let body = serde_json::to_vec(event)
            .map_err(|e| CoreError::Publish(format!("failed to serialize event: {e}")))?;

        self.context
            .publish(subject.clone(), body.into())
            .await
            .map_err(|e| CoreError::Publish(format!("failed to publish to {subject}: {e}")))?
            .await
            .map_err(|e| CoreError::Publish(format!("no ack for {subject}: {e}")))?;

        debug!(subject = %subject, district_id = %event.district_id, "Event published");
        Ok(())
    }
}

impl std::fmt::Debug for JetStreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamSink")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Queues a district's [`SyncEvent`]s for the publishing worker.
///
/// Cheap to clone; clones share the queue. The worker stops once every
/// clone is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    queue: mpsc::Sender<SyncEvent>,
    outcomes: OutcomeSender,
    district_id: DistrictId,
}

impl EventPublisher {
    /// Connect to JetStream and start the worker for one district.
    pub async fn connect(
        client: async_nats::Client,
        broker: &BrokerConfig,
        district_id: DistrictId,
        outcomes: OutcomeSender,
    ) -> Result<Self, CoreError> {
        let sink = JetStreamSink::connect(client, broker).await?;
        let (publisher, _worker) = Self::spawn(sink, district_id, DEFAULT_PUBLISH_QUEUE, outcomes);
        Ok(publisher)
    }

    /// Start a worker draining into `sink`, with room for `capacity`
    /// waiting events (at least 1).
    pub fn spawn<K: EventSink>(
        sink: K,
        district_id: DistrictId,
        capacity: usize,
        outcomes: OutcomeSender,
    ) -> (Self, JoinHandle<()>) {
        let (queue, pending) = mpsc::channel(capacity.max(1));
        let worker_outcomes = outcomes.clone();
        let worker = spawn_reported(
            "event publisher",
            async move {
                drain(&sink, pending, &worker_outcomes).await;
                Ok::<(), Infallible>(())
            },
            outcomes.clone(),
        );
        let publisher = Self {
            queue,
            outcomes,
            district_id,
        };
        (publisher, worker)
    }

    /// The district events are stamped with.
    pub const fn district_id(&self) -> DistrictId {
        self.district_id
    }

    /// Build the event for an action.
    pub fn event(&self, action: SyncAction, payload: serde_json::Value) -> SyncEvent {
        SyncEvent::new(action, self.district_id, payload)
    }

    /// Queue an event carrying `record` without waiting.
    ///
    /// A record that cannot be encoded, a full queue or a stopped worker is
    /// logged and reported as a failed outcome.
    pub fn publish<T: Serialize>(&self, action: SyncAction, record: &T) {
        let label = publish_label(&action);
        let payload = match serde_json::to_value(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%action, error = %e, "Failed to encode event payload, event not published");
                report_now(
                    &self.outcomes,
                    label,
                    Err(CoreError::Publish(format!("failed to encode payload: {e}"))),
                );
                return;
            }
        };

        match self.queue.try_send(self.event(action, payload)) {
            Ok(()) => debug!(task = %label, "Event queued"),
            Err(TrySendError::Full(event)) => {
                warn!(action = %event.action, "Publish queue full, event dropped");
                report_now(
                    &self.outcomes,
                    label,
                    Err(CoreError::Publish("publish queue full".to_owned())),
                );
            }
            Err(TrySendError::Closed(event)) => {
                warn!(action = %event.action, "Publisher worker stopped, event dropped");
                report_now(
                    &self.outcomes,
                    label,
                    Err(CoreError::Publish("publisher worker stopped".to_owned())),
                );
            }
        }
    }
}

/// Send queued events one at a time until the queue closes.
async fn drain<K: EventSink>(
    sink: &K,
    mut pending: mpsc::Receiver<SyncEvent>,
    outcomes: &OutcomeSender,
) {
    while let Some(event) = pending.recv().await {
        let result = sink.send(&event).await;
        report(outcomes, publish_label(&event.action), result).await;
    }
    debug!("Publish queue closed");
}
