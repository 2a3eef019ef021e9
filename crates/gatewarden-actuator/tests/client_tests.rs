//! Behavior tests for the actuator client against a mock gate controller.

use std::time::Duration;

use gatewarden_actuator::{Actuator, ActuatorClient, ActuatorConfig, ActuationError, RetryPolicy};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(endpoint: String) -> ActuatorConfig {
    ActuatorConfig {
        endpoint: Some(endpoint),
        token: Some("gate-secret".to_string()),
        timeout_secs: 1,
        open_duration_secs: 5,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    }
}

#[tokio::test]
async fn open_posts_payload_with_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/open"))
        .and(header("Authorization", "Bearer gate-secret"))
        .and(body_partial_json(serde_json::json!({
            "action": "open",
            "duration_seconds": 5,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ActuatorClient::new(test_config(format!("{}/open", server.uri()))).unwrap();
    let latency = client.open().await.expect("actuation should succeed");

    assert!(latency < Duration::from_secs(1));
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = ActuatorClient::new(test_config(format!("{}/open", server.uri()))).unwrap();

    client
        .open()
        .await
        .expect("third attempt should succeed within the retry budget");
}

#[tokio::test]
async fn persistent_failure_exhausts_retry_budget() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = ActuatorClient::new(test_config(format!("{}/open", server.uri()))).unwrap();
    let err = client.open().await.expect_err("all attempts fail");

    match err {
        ActuationError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ActuationError::Status(503)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_responses_count_as_timeouts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = test_config(format!("{}/open", server.uri()));
    config.retry.max_attempts = 1;
    let client = ActuatorClient::new(config).unwrap();

    let err = client.open().await.expect_err("request exceeds timeout");
    match err {
        ActuationError::RetriesExhausted { last, .. } => {
            assert!(last.is_timeout(), "expected timeout, got {last:?}");
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn unconfigured_endpoint_simulates_success() {
    let client = ActuatorClient::new(ActuatorConfig::default()).unwrap();
    let latency = client.open().await.expect("simulated success");
    assert_eq!(latency, Duration::ZERO);
}
