//! Wire-level tests for the validator and reporter HTTP clients.

use quillforge_core::{PlanType, ToolKind, TransactionId, UserId};
use quillforge_engine::{
    HttpReporter, HttpValidator, PlanValidator, UsageReport, UsageReporter, ValidationRequest,
    ValidatorError,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn validation_request(user_id: UserId) -> ValidationRequest {
    ValidationRequest {
        user_id,
        prompt_chars: 26,
        requested_words: 300,
        tool: ToolKind::Essay,
    }
}

#[tokio::test]
async fn validator_posts_the_expected_payload() {
    let server = MockServer::start().await;
    let user_id = UserId::generate();

    Mock::given(method("POST"))
        .and(path("/v1/validate"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_json(json!({
            "user_id": user_id.to_string(),
            "prompt_chars": 26,
            "requested_words": 300,
            "tool": "essay"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plan": "standard"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpValidator::new(server.uri(), "test-key");
    let validation = client.validate(&validation_request(user_id)).await.unwrap();

    assert_eq!(validation.plan, PlanType::Standard);
}

#[tokio::test]
async fn validator_maps_policy_rejections() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/validate"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "tool disabled for plan"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpValidator::new(server.uri(), "test-key");
    let err = client
        .validate(&validation_request(UserId::generate()))
        .await
        .unwrap_err();

    assert!(matches!(err, ValidatorError::Rejected { .. }));
    assert_eq!(err.to_string(), "tool disabled for plan");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn validator_retries_transient_failures_once() {
    let server = MockServer::start().await;

    // First call hits a 503; the retry lands on the healthy mock.
    Mock::given(method("POST"))
        .and(path("/v1/validate"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "deploy in progress"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plan": "pro"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpValidator::new(server.uri(), "test-key");
    let validation = client
        .validate(&validation_request(UserId::generate()))
        .await
        .unwrap();

    assert_eq!(validation.plan, PlanType::Pro);
}

#[tokio::test]
async fn validator_gives_up_after_the_single_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/validate"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "still down"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpValidator::new(server.uri(), "test-key");
    let err = client
        .validate(&validation_request(UserId::generate()))
        .await
        .unwrap_err();

    assert!(matches!(err, ValidatorError::Api { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn reporter_posts_the_event() {
    let server = MockServer::start().await;
    let user_id = UserId::generate();
    let transaction_id = TransactionId::generate();

    // The timestamp is wall-clock, so only the stable fields are matched.
    Mock::given(method("POST"))
        .and(path("/v1/usage_events"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "event": {
                "transaction_id": transaction_id.to_string(),
                "user_id": user_id.to_string(),
                "tool": "article",
                "words": 900,
                "credits": 300
            }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpReporter::new(server.uri(), "test-key");
    client
        .record(&UsageReport {
            user_id,
            transaction_id,
            tool: ToolKind::Article,
            words: 900,
            credits: 300,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn reporter_maps_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/usage_events"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>boom</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpReporter::new(server.uri(), "test-key");
    let err = client
        .record(&UsageReport {
            user_id: UserId::generate(),
            transaction_id: TransactionId::generate(),
            tool: ToolKind::Essay,
            words: 10,
            credits: 5,
        })
        .await
        .unwrap_err();

    // The error body is not the expected shape, so the status line stands in.
    assert!(err.to_string().contains("500"));
    assert!(err.to_string().contains("HTTP 500"));
}
