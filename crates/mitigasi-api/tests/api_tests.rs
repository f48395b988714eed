//! Integration tests for the city and district routers.
//!
//! Requests go through the `Router` via `tower::ServiceExt` against the
//! in-memory stores, without binding a TCP port.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use mitigasi_api::{BroadcastHub, CityState, DistrictState, city_router, district_router};
use mitigasi_core::tasks::outcome_channel;
use mitigasi_core::{CoreError, EventPublisher, EventSink};
use mitigasi_db::{
    AggregateBackend, AggregateStore, DistrictBackend, MemoryAggregateStore, MemoryDistrictStore,
};
use mitigasi_types::{DistrictId, DistrictSummary, SyncAction, SyncEvent};
use serde_json::Value;
use tower::ServiceExt;

fn city() -> (Router, MemoryAggregateStore, Arc<BroadcastHub>) {
    let store = MemoryAggregateStore::new();
    let hub = Arc::new(BroadcastHub::new());
    let state = CityState::new(AggregateBackend::Memory(store.clone()), Arc::clone(&hub));
    (city_router(state), store, hub)
}

fn district_state(hub: &Arc<BroadcastHub>) -> DistrictState {
    DistrictState::new(
        DistrictBackend::Memory(MemoryDistrictStore::new()),
        Arc::clone(hub),
        DistrictId(7),
    )
}

fn district() -> (Router, Arc<BroadcastHub>) {
    let hub = Arc::new(BroadcastHub::new());
    (district_router(district_state(&hub)), hub)
}

/// Records the events it is given, in order.
#[derive(Default)]
struct RecordingSink {
    sent: Arc<Mutex<Vec<SyncEvent>>>,
}

impl EventSink for RecordingSink {
    async fn send(&self, event: &SyncEvent) -> Result<(), CoreError> {
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Never finishes a send.
struct StuckSink;

impl EventSink for StuckSink {
    async fn send(&self, _: &SyncEvent) -> Result<(), CoreError> {
        std::future::pending().await
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_owned()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn seed(store: &MemoryAggregateStore, id: u32, residents: u32, vulnerable: u32, active: u32) {
    let summary = DistrictSummary {
        total_residents: residents,
        total_vulnerable: vulnerable,
        active_incidents: active,
    };
    store
        .apply_summary(DistrictId(id), &summary, Utc::now())
        .await
        .unwrap();
}

// =============================================================================
// City
// =============================================================================

#[tokio::test]
async fn health_is_ok() {
    let (router, _, _) = city();
    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn city_overview_is_empty_before_any_sync() {
    let (router, _, _) = city();
    let (status, body) = get(&router, "/api/v1/monitoring/kota").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], false);
    assert_eq!(body["data"]["monitoring"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["total_warga"], 0);
    assert_eq!(body["data"]["active_bencana_count"], 0);
}

#[tokio::test]
async fn city_overview_sums_every_district() {
    let (router, store, _) = city();
    seed(&store, 1, 100, 20, 0).await;
    seed(&store, 2, 50, 10, 6).await;

    let (_, body) = get(&router, "/api/v1/monitoring/kota").await;
    let data = &body["data"];
    assert_eq!(data["rekap_kecamatan"].as_array().unwrap().len(), 2);
    assert_eq!(data["monitoring"].as_array().unwrap().len(), 2);
    assert_eq!(data["total_warga"], 150);
    assert_eq!(data["total_kerentanan"], 30);
    assert_eq!(data["active_bencana_count"], 6);
}

#[tokio::test]
async fn district_monitoring_returns_status_and_recap() {
    let (router, store, _) = city();
    seed(&store, 3, 40, 4, 3).await;

    let (status, body) = get(&router, "/api/v1/monitoring/kecamatan/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["bencana_monitoring"]["status_level"], "Siaga");
    assert_eq!(body["data"]["bencana_monitoring"]["jenis_bencana"], "Agregat");
    assert_eq!(body["data"]["rekap_wilayah"]["total_warga"], 40);

    let (status, body) = get(&router, "/api/v1/monitoring/kecamatan/99").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["bencana_monitoring"].is_null());
    assert!(body["data"]["rekap_wilayah"].is_null());
}

#[tokio::test]
async fn recap_of_unknown_district_is_not_found() {
    let (router, store, _) = city();
    seed(&store, 5, 12, 2, 0).await;

    let (status, body) = get(&router, "/api/v1/monitoring/rekap/5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rekap"]["kecamatan_id"], 5);

    let (status, body) = get(&router, "/api/v1/monitoring/rekap/6").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn malformed_district_id_is_a_bad_request() {
    let (router, _, _) = city();
    let (status, body) = get(&router, "/api/v1/monitoring/rekap/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn statistics_lists_every_recap() {
    let (router, store, _) = city();
    seed(&store, 1, 10, 1, 0).await;
    seed(&store, 2, 20, 2, 1).await;

    let (status, body) = get(&router, "/api/v1/monitoring/statistik").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_kecamatan"], 2);
    assert_eq!(body["data"]["total_warga"], 30);
    assert_eq!(body["data"]["rekap_kecamatan"][0]["kecamatan_id"], 1);
}

// =============================================================================
// District
// =============================================================================

#[tokio::test]
async fn summary_reflects_reports() {
    let (router, _) = district();

    let (status, body) = get(&router, "/api/v1/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], false);
    assert_eq!(body["data"]["total_warga"], 0);

    let (status, body) = post(
        &router,
        "/api/v1/warga",
        r#"{"nik":"3201010101010001","nama":"Siti","kategori_rentan":"Lansia"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["kategori_rentan"], "Lansia");

    post(
        &router,
        "/api/v1/warga",
        r#"{"nik":"3201010101010002","nama":"Budi","kategori_rentan":"Non-Rentan"}"#,
    )
    .await;

    let (status, body) = post(
        &router,
        "/api/v1/bencana",
        r#"{"jenis_bencana":"Banjir","level":"Kecamatan","deskripsi":"Sungai meluap"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "Aktif");

    let (_, body) = get(&router, "/api/v1/summary").await;
    assert_eq!(body["data"]["total_warga"], 2);
    assert_eq!(body["data"]["total_rentan"], 1);
    assert_eq!(body["data"]["bencana_aktif"], 1);
}

#[tokio::test]
async fn duplicate_nik_is_a_conflict() {
    let (router, _) = district();
    let body = r#"{"nik":"3201010101010009","nama":"Ani","kategori_rentan":"Anak-anak"}"#;
    let (status, _) = post(&router, "/api/v1/warga", body).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, response) = post(&router, "/api/v1/warga", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["error"], true);
}

#[tokio::test]
async fn invalid_reports_are_rejected() {
    let (router, _) = district();

    let (status, _) = post(
        &router,
        "/api/v1/bencana",
        r#"{"jenis_bencana":"","level":"Lokal_RT"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = post(&router, "/api/v1/bencana", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);

    let (_, summary) = get(&router, "/api/v1/summary").await;
    assert_eq!(summary["data"]["bencana_aktif"], 0);
}

#[tokio::test]
async fn reports_are_published_in_request_order() {
    let hub = Arc::new(BroadcastHub::new());
    let sink = RecordingSink::default();
    let sent = Arc::clone(&sink.sent);
    let (outcomes, _reports) = outcome_channel(16);
    let (publisher, worker) = EventPublisher::spawn(sink, DistrictId(7), 8, outcomes);
    let router = district_router(district_state(&hub).with_publisher(publisher));

    for body in [
        r#"{"jenis_bencana":"Banjir","level":"Kecamatan"}"#,
        r#"{"jenis_bencana":"Longsor","level":"Lokal_RT"}"#,
    ] {
        let (status, _) = post(&router, "/api/v1/bencana", body).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = post(
        &router,
        "/api/v1/warga",
        r#"{"nik":"3201010101010003","nama":"Rina","kategori_rentan":"Ibu Hamil"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    drop(router);
    worker.await.unwrap();

    let sent = sent.lock().unwrap();
    let actions: Vec<&SyncAction> = sent.iter().map(|e| &e.action).collect();
    assert_eq!(
        actions,
        [
            &SyncAction::IncidentCreated,
            &SyncAction::IncidentCreated,
            &SyncAction::ResidentAdded,
        ]
    );
    assert_eq!(sent[0].payload_str("jenis_bencana"), Some("Banjir"));
    assert_eq!(sent[1].payload_str("jenis_bencana"), Some("Longsor"));
    assert_eq!(sent[2].payload_str("kategori_rentan"), Some("Ibu Hamil"));
    assert!(sent.iter().all(|e| e.district_id == DistrictId(7)));
}

#[tokio::test]
async fn failed_publish_does_not_fail_the_report() {
    let hub = Arc::new(BroadcastHub::new());
    let (outcomes, mut reports) = outcome_channel(16);
    let (publisher, _worker) = EventPublisher::spawn(StuckSink, DistrictId(7), 1, outcomes);
    let router = district_router(district_state(&hub).with_publisher(publisher));

    for jenis in ["Banjir", "Longsor", "Kebakaran"] {
        let body = format!(r#"{{"jenis_bencana":"{jenis}","level":"Kecamatan"}}"#);
        let (status, _) = post(&router, "/api/v1/bencana", &body).await;
        assert_eq!(status, StatusCode::CREATED);
        tokio::task::yield_now().await;
    }

    let (_, summary) = get(&router, "/api/v1/summary").await;
    assert_eq!(summary["data"]["bencana_aktif"], 3);

    let outcome = reports.try_recv().unwrap();
    assert_eq!(outcome.label, "publish INCIDENT_CREATED");
    assert!(outcome.result.is_err());
}

// =============================================================================
// Broadcast
// =============================================================================

#[tokio::test]
async fn emergency_broadcast_reaches_registered_clients() {
    let (router, hub) = district();
    let (_id, mut queue) = hub.register();

    let (status, body) = post(
        &router,
        "/api/v1/notifikasi/darurat",
        r#"{"jenis_bencana":"Banjir","level":"Awas","pesan":"Segera mengungsi"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["delivered"], 1);
    assert_eq!(body["report"]["dropped"], 0);
    assert_eq!(body["data"]["pesan"], "Segera mengungsi");

    let received = queue.recv().await.unwrap();
    assert_eq!(received.incident_type, "Banjir");
}

#[tokio::test]
async fn emergency_broadcast_validates_the_message() {
    let (router, _, _) = city();
    let (status, _) = post(
        &router,
        "/api/v1/notifikasi/darurat",
        r#"{"jenis_bencana":"Banjir","level":"Awas","pesan":""}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stream_registers_and_releases_a_client() {
    let (router, _, hub) = city();
    let response = router
        .oneshot(
            Request::get("/api/v1/broadcast/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(hub.client_count(), 1);

    drop(response);
    for _ in 0..50 {
        if hub.client_count() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(hub.client_count(), 0);
}
