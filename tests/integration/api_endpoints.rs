//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Path and JSON ingestion store samples with the right semantics
//! - Status codes follow the error mapping (400 / 404 / 501)
//! - Integrity checks reject unsigned or tampered samples
//! - Batches are all-or-nothing
//! - Write-through mode persists after every update

use std::sync::Arc;
use std::time::Duration;

use alertics::{
    MetricPayload, MetricSample,
    actors::{FlushHandle, Lifecycle},
    api::ApiState,
    signing::Signer,
    storage::{MemoryStorage, MetricStorage, Snapshot},
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::helpers::{TEST_KEY, eventually, memory_storage, spawn_test_server, url};

fn state(storage: &Arc<MemoryStorage>) -> ApiState {
    ApiState::new(storage.clone())
}

fn signed_state(storage: &Arc<MemoryStorage>) -> ApiState {
    ApiState::new(storage.clone()).with_signer(Some(Signer::new(TEST_KEY)))
}

#[tokio::test]
async fn test_path_update_and_lookup() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    for value in ["100", "250"] {
        let response = client
            .post(url(&server, &format!("/update/gauge/Alloc/{value}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    for _ in 0..3 {
        let response = client
            .post(url(&server, "/update/counter/PollCount/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let gauge: Value = client
        .get(url(&server, "/value/gauge/Alloc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(gauge, json!(250.0));

    let counter: Value = client
        .get(url(&server, "/value/counter/PollCount"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counter, json!(3));
}

#[tokio::test]
async fn test_path_update_rejections() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let cases = [
        ("/update/histogram/Alloc/1", StatusCode::NOT_IMPLEMENTED),
        ("/update/histogram/Alloc/abc", StatusCode::NOT_IMPLEMENTED),
        ("/update/gauge/Alloc/abc", StatusCode::BAD_REQUEST),
        ("/update/counter/PollCount/1.5", StatusCode::BAD_REQUEST),
        ("/update/counter/PollCount/none", StatusCode::BAD_REQUEST),
    ];

    for (path, expected) in cases {
        let response = client.post(url(&server, path)).send().await.unwrap();
        assert_eq!(response.status(), expected, "POST {path}");
    }

    assert!(storage.is_empty(), "rejected samples must not be stored");
}

#[tokio::test]
async fn test_value_lookup_not_found() {
    let storage = memory_storage();
    storage.add_gauge("Alloc", 1.0).await.unwrap();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    for path in [
        "/value/gauge/Missing",
        "/value/counter/Alloc",
        "/value/histogram/Alloc",
    ] {
        let response = client.get(url(&server, path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {path}");
    }
}

#[tokio::test]
async fn test_json_update_returns_current_value() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let mut last = None;
    for _ in 0..2 {
        let response = client
            .post(url(&server, "/update"))
            .json(&json!({"id": "Hits", "type": "counter", "delta": 4}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = Some(response.json::<MetricPayload>().await.unwrap());
    }

    let last = last.unwrap();
    assert_eq!(last.id, "Hits");
    assert_eq!(last.mtype, "counter");
    assert_eq!(last.delta, Some(8));
    assert_eq!(last.value, None);
}

#[tokio::test]
async fn test_concurrent_json_updates_see_their_own_write() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let requests = (0..20).map(|_| {
        let client = client.clone();
        let endpoint = url(&server, "/update");
        async move {
            client
                .post(endpoint)
                .json(&json!({"id": "Hits", "type": "counter", "delta": 1}))
                .send()
                .await
                .unwrap()
                .json::<MetricPayload>()
                .await
                .unwrap()
        }
    });

    let mut totals: Vec<i64> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|payload| payload.delta.unwrap())
        .collect();
    totals.sort_unstable();

    assert_eq!(totals, (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_id_reused_under_other_kind_is_rejected() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/update/gauge/Alloc/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(url(&server, "/update/counter/Alloc/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(url(&server, "/update"))
        .json(&json!({"id": "Alloc", "type": "counter", "delta": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let dump: Snapshot = client
        .get(url(&server, "/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dump.gauge.get("Alloc"), Some(&1.0));
    assert!(dump.counter.is_empty());
}

#[tokio::test]
async fn test_json_update_rejections() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let cases = [
        (json!({"id": "Alloc", "type": "histogram", "value": 1.0}), StatusCode::NOT_IMPLEMENTED),
        (json!({"id": "Alloc", "type": "gauge"}), StatusCode::BAD_REQUEST),
        (json!({"id": "Hits", "type": "counter", "value": 1.0}), StatusCode::BAD_REQUEST),
        (json!({"id": "", "type": "gauge", "value": 1.0}), StatusCode::BAD_REQUEST),
        (json!({"type": "gauge", "value": 1.0}), StatusCode::BAD_REQUEST),
    ];

    for (body, expected) in cases {
        let response = client
            .post(url(&server, "/update"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "POST /update {body}");

        let error: Value = response.json().await.unwrap();
        assert!(error["error"].is_string());
    }

    let response = client
        .post(url(&server, "/update"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_json_update_integrity_check() {
    let storage = memory_storage();
    let server = spawn_test_server(signed_state(&storage)).await;
    let client = reqwest::Client::new();
    let signer = Signer::new(TEST_KEY);

    // Unsigned
    let response = client
        .post(url(&server, "/update"))
        .json(&json!({"id": "Alloc", "type": "gauge", "value": 42.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Signed for a different value
    let wrong = signer.sign(&MetricSample::gauge("Alloc", 41.0));
    let response = client
        .post(url(&server, "/update"))
        .json(&json!({"id": "Alloc", "type": "gauge", "value": 42.0, "hash": wrong}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(storage.is_empty());

    // Correctly signed
    let tag = signer.sign(&MetricSample::gauge("Alloc", 42.0));
    let response = client
        .post(url(&server, "/update"))
        .json(&json!({"id": "Alloc", "type": "gauge", "value": 42.0, "hash": tag}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: MetricPayload = response.json().await.unwrap();
    assert_eq!(body.hash, Some(tag));
    assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 42.0);
}

#[tokio::test]
async fn test_batch_update() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/updates"))
        .json(&json!([
            {"id": "Alloc", "type": "gauge", "value": 10.5},
            {"id": "PollCount", "type": "counter", "delta": 2},
            {"id": "PollCount", "type": "counter", "delta": 3},
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 10.5);
    assert_eq!(storage.get_counter("PollCount").await.unwrap(), 5);
}

#[tokio::test]
async fn test_batch_update_is_all_or_nothing() {
    let storage = memory_storage();
    let server = spawn_test_server(signed_state(&storage)).await;
    let client = reqwest::Client::new();
    let signer = Signer::new(TEST_KEY);

    let good = MetricSample::counter("PollCount", 1);
    let good_tag = signer.sign(&good);

    let response = client
        .post(url(&server, "/updates"))
        .json(&json!([
            {"id": "PollCount", "type": "counter", "delta": 1, "hash": good_tag},
            {"id": "Alloc", "type": "gauge", "value": 1.0, "hash": "deadbeef"},
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(url(&server, "/updates"))
        .json(&json!([
            {"id": "PollCount", "type": "counter", "delta": 1, "hash": good_tag},
            {"id": "Alloc", "type": "summary", "value": 1.0},
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_value_json_lookup() {
    let storage = memory_storage();
    storage.add_counter("Hits", 5).await.unwrap();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&server, "/value"))
        .json(&json!({"id": "Hits", "type": "counter"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"id": "Hits", "type": "counter", "delta": 5})
    );

    for body in [
        json!({"id": "Hits", "type": "gauge"}),
        json!({"id": "Hits", "type": "histogram"}),
    ] {
        let response = client
            .post(url(&server, "/value"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "POST /value {body}");
    }
}

#[tokio::test]
async fn test_dump_and_ping() {
    let storage = memory_storage();
    storage.add_gauge("Alloc", 42.0).await.unwrap();
    storage.add_counter("Hits", 5).await.unwrap();
    let server = spawn_test_server(state(&storage)).await;
    let client = reqwest::Client::new();

    let dump: Snapshot = client
        .get(url(&server, "/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dump, storage.snapshot().await.unwrap());

    let response = client.get(url(&server, "/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_response_compression() {
    let storage = memory_storage();
    for n in 0..20 {
        storage.add_gauge(&format!("Gauge{n}"), n as f64).await.unwrap();
    }
    let server = spawn_test_server(state(&storage)).await;

    let response = reqwest::Client::new()
        .get(url(&server, "/"))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-encoding")
            .and_then(|v| v.to_str().ok()),
        Some("gzip")
    );
}

#[tokio::test]
async fn test_write_through_persists_each_update() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("metrics.json");
    let storage = memory_storage();
    let (lifecycle, _) = watch::channel(Lifecycle::Running);
    let flusher = FlushHandle::spawn(storage.clone(), path.clone(), None, Arc::new(lifecycle));

    let server =
        spawn_test_server(state(&storage).with_write_through(flusher.clone())).await;

    let response = reqwest::Client::new()
        .post(url(&server, "/update/counter/Hits/7"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let persisted = eventually(|| {
        let path = path.clone();
        async move {
            std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<Snapshot>(&raw).ok())
                .is_some_and(|snapshot| snapshot.counter.get("Hits") == Some(&7))
        }
    })
    .await;
    assert!(persisted, "snapshot was not written after the update");

    assert!(server.shutdown(Duration::from_secs(5)).await);
    flusher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_graceful_shutdown_stops_listening() {
    let storage = memory_storage();
    let server = spawn_test_server(state(&storage)).await;
    let address = url(&server, "/ping");

    assert!(server.shutdown(Duration::from_secs(5)).await);
    assert!(reqwest::get(&address).await.is_err());
}
