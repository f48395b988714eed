//! Integration tests for publishing and consuming district events.
//!
//! These tests require a live NATS server with JetStream enabled at
//! `TEST_NATS_URL` (default `nats://localhost:4222`). Run with:
//!
//! ```bash
//! nats-server -js &
//! cargo test -p mitigasi-core -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use mitigasi_core::config::BrokerConfig;
use mitigasi_core::tasks::outcome_channel;
use mitigasi_core::{
    Disposition, EventFeed, EventPublisher, EventSynchronizer, FeedMessage, JetStreamFeed,
    JetStreamSink, nats,
};
use mitigasi_db::{AggregateStore, MemoryAggregateStore};
use mitigasi_types::{DistrictId, SeverityLevel, SyncAction, SyncEvent};
use serde_json::json;
use uuid::Uuid;

/// A broker section with a stream and consumer unique to this run.
fn isolated_broker() -> BrokerConfig {
    let run = Uuid::now_v7().simple().to_string();
    BrokerConfig {
        stream: format!("TEST_{run}"),
        topic: format!("test.{run}"),
        consumer_group: format!("kota-{run}"),
    }
}

async fn client() -> async_nats::Client {
    let url = std::env::var("TEST_NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_owned());
    nats::connect(&url).await.expect("NATS must be running")
}

#[tokio::test]
#[ignore = "requires live NATS with JetStream"]
async fn published_events_reach_the_durable_consumer_in_order() {
    let broker = isolated_broker();
    let sink = JetStreamSink::connect(client().await, &broker).await.unwrap();
    let (outcomes, mut reports) = outcome_channel(8);
    let (publisher, worker) = EventPublisher::spawn(sink, DistrictId(4), 8, outcomes);

    for incident_type in ["Banjir", "Longsor"] {
        publisher.publish(
            SyncAction::IncidentCreated,
            &json!({ "jenis_bencana": incident_type }),
        );
    }
    drop(publisher);
    worker.await.unwrap();
    while let Ok(outcome) = reports.try_recv() {
        assert!(outcome.result.is_ok(), "{outcome:?}");
    }

    let mut feed = JetStreamFeed::subscribe(client().await, &broker).await.unwrap();
    let first = feed.next_message().await.unwrap();
    let decoded: SyncEvent = serde_json::from_slice(first.payload()).unwrap();
    assert_eq!(decoded.action, SyncAction::IncidentCreated);
    assert_eq!(decoded.district_id, DistrictId(4));
    assert_eq!(decoded.payload_str("jenis_bencana"), Some("Banjir"));
    first.ack().await.unwrap();

    let store = MemoryAggregateStore::new();
    let second = feed.next_message().await.unwrap();
    let sync = EventSynchronizer::new(store.clone(), feed);
    assert_eq!(sync.handle(second).await.unwrap(), Disposition::Applied);

    let status = store.incident_status(DistrictId(4)).await.unwrap().unwrap();
    assert_eq!(status.incident_type, "Longsor");
    assert_eq!(status.severity_level, SeverityLevel::Alert);
}
