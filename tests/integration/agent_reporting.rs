//! Integration tests for the reporting agent
//!
//! These tests verify that:
//! - Batches are posted to `/updates` as JSON samples
//! - Every sample carries a valid hash when a key is configured
//! - Server errors surface as report failures
//! - The agent loop keeps reporting until shut down

use std::time::Duration;

use alertics::{
    MetricKind, MetricPayload, MetricSample,
    agent::{Reporter, run_agent},
    config::AgentConfig,
    signing::Signer,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::TEST_KEY;

async fn mock_updates(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

async fn received_batches(server: &MockServer) -> Vec<Vec<MetricPayload>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_report_posts_signed_batch() {
    let server = mock_updates(200).await;
    let reporter = Reporter::new(&server.uri(), Some(Signer::new(TEST_KEY))).unwrap();

    let samples = vec![
        MetricSample::gauge("TotalMemory", 16_000_000_000.0),
        MetricSample::counter("PollCount", 5),
    ];
    reporter.report(&samples).await.unwrap();

    let batches = received_batches(&server).await;
    assert_eq!(batches.len(), 1);

    let signer = Signer::new(TEST_KEY);
    for (payload, sample) in batches[0].iter().zip(&samples) {
        let tag = payload.hash.clone().expect("sample was not signed");
        let decoded = MetricSample::try_from(payload.clone()).unwrap();

        assert_eq!(decoded.value, sample.value);
        assert!(signer.verify(&decoded, &tag));
    }
}

#[tokio::test]
async fn test_report_without_key_sends_no_hash() {
    let server = mock_updates(200).await;
    let reporter = Reporter::new(&server.uri(), None).unwrap();

    reporter
        .report(&[MetricSample::counter("PollCount", 1)])
        .await
        .unwrap();

    let batches = received_batches(&server).await;
    assert_eq!(batches[0][0].hash, None);
}

#[tokio::test]
async fn test_report_fails_on_server_error() {
    let server = mock_updates(500).await;
    let reporter = Reporter::new(&server.uri(), None).unwrap();

    assert!(
        reporter
            .report(&[MetricSample::counter("PollCount", 1)])
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_agent_loop_reports_until_shutdown() {
    let server = mock_updates(200).await;
    let config = AgentConfig {
        address: server.uri(),
        report_interval: Duration::from_millis(100),
        poll_interval: Duration::from_millis(20),
        key: Some(TEST_KEY.to_string()),
    };

    run_agent(config, tokio::time::sleep(Duration::from_millis(450)))
        .await
        .unwrap();

    let batches = received_batches(&server).await;
    assert!(batches.len() >= 2, "expected several reports, got {}", batches.len());

    let signer = Signer::new(TEST_KEY);
    for batch in &batches {
        let samples: Vec<MetricSample> = batch
            .iter()
            .cloned()
            .map(|payload| MetricSample::try_from(payload).unwrap())
            .collect();

        assert!(samples.iter().any(|s| s.id == "TotalMemory"));
        assert!(samples.iter().all(|s| signer.verify(s, s.hash.as_deref().unwrap())));

        let poll_count = samples
            .iter()
            .find(|s| s.kind() == MetricKind::Counter)
            .unwrap();
        assert_eq!(poll_count.id, "PollCount");
    }
}

#[cfg(feature = "api")]
#[tokio::test]
async fn test_agent_against_real_server() {
    use std::sync::Arc;

    use alertics::api::ApiState;
    use alertics::storage::{MemoryStorage, MetricStorage};

    use crate::helpers::{eventually, spawn_test_server};

    let storage = Arc::new(MemoryStorage::new());
    let server = spawn_test_server(
        ApiState::new(storage.clone()).with_signer(Some(Signer::new(TEST_KEY))),
    )
    .await;

    let config = AgentConfig {
        address: server.addr().to_string(),
        report_interval: Duration::from_millis(100),
        poll_interval: Duration::from_millis(20),
        key: Some(TEST_KEY.to_string()),
    };

    let agent = tokio::spawn(run_agent(config, tokio::time::sleep(Duration::from_secs(5))));

    let reported = eventually(|| {
        let storage = storage.clone();
        async move { storage.get_counter("PollCount").await.is_ok_and(|count| count > 0) }
    })
    .await;
    assert!(reported, "agent samples never reached the server");
    assert!(storage.get_gauge("TotalMemory").await.is_ok());

    agent.abort();
    server.shutdown(Duration::from_secs(5)).await;
}
