//! Wire-level tests for the generator and detector HTTP clients.

use std::time::Duration;

use quillforge_pipeline::{
    Detector, DetectorError, Generator, GeneratorError, GeneratorRequest, HttpDetector,
    HttpGenerator,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator_request() -> GeneratorRequest {
    GeneratorRequest {
        prompt: "Write about tea".to_string(),
        target_word_count: 150,
        style: Some("narrative".to_string()),
        tone: Some("warm".to_string()),
    }
}

#[tokio::test]
async fn generator_posts_the_expected_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_json(json!({
            "model": "quill-large",
            "prompt": "Write about tea",
            "target_word_count": 150,
            "style": "narrative",
            "tone": "warm"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "Tea arrived in Europe in the seventeenth century.",
            "model": "quill-large-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpGenerator::new(server.uri(), "test-key", "quill-large");
    let generated = client.generate(&generator_request()).await.unwrap();

    assert_eq!(
        generated.text,
        "Tea arrived in Europe in the seventeenth century."
    );
    assert_eq!(generated.model.as_deref(), Some("quill-large-2"));
}

#[tokio::test]
async fn generator_omits_unset_hints() {
    let server = MockServer::start().await;

    // Absent style and tone must not appear as nulls in the payload.
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .and(body_json(json!({
            "model": "quill-large",
            "prompt": "Write about tea",
            "target_word_count": 150
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": "Tea.", "model": null })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpGenerator::new(server.uri(), "test-key", "quill-large");
    let mut request = generator_request();
    request.style = None;
    request.tone = None;

    let generated = client.generate(&request).await.unwrap();
    assert_eq!(generated.text, "Tea.");
    assert!(generated.model.is_none());
}

#[tokio::test]
async fn generator_maps_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "error": "prompt rejected" })),
        )
        .mount(&server)
        .await;

    let client = HttpGenerator::new(server.uri(), "test-key", "quill-large");
    let err = client.generate(&generator_request()).await.unwrap_err();

    match err {
        GeneratorError::Api { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "prompt rejected");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn generator_rate_limits_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "error": "slow down" })))
        .mount(&server)
        .await;

    let client = HttpGenerator::new(server.uri(), "test-key", "quill-large");
    let err = client.generate(&generator_request()).await.unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn generator_falls_back_to_the_status_line() {
    let server = MockServer::start().await;

    // A body that is not the expected error shape.
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = HttpGenerator::new(server.uri(), "test-key", "quill-large");
    let err = client.generate(&generator_request()).await.unwrap_err();

    match err {
        GeneratorError::Api { status, message } => {
            assert_eq!(status, 500);
            assert!(message.starts_with("HTTP 500"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn generator_times_out_on_slow_responses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "text": "late", "model": null }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = HttpGenerator::new(server.uri(), "test-key", "quill-large")
        .with_timeout(Duration::from_millis(100));
    let err = client.generate(&generator_request()).await.unwrap_err();

    match &err {
        GeneratorError::Http(e) => assert!(e.is_timeout()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn detector_maps_scores() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/detect"))
        .and(header("Authorization", "Bearer detect-key"))
        .and(body_json(json!({ "text": "Tea is a drink." })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "originality": 88.5,
            "ai_likelihood": 12.0,
            "plagiarism": 3.5,
            "confidence": 91.0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpDetector::new(server.uri(), "detect-key");
    let scores = client.detect("Tea is a drink.").await.unwrap();

    assert_eq!(scores.originality, 88.5);
    assert_eq!(scores.ai_likelihood, 12.0);
    assert_eq!(scores.plagiarism, 3.5);
    assert_eq!(scores.confidence, 91.0);
}

#[tokio::test]
async fn detector_maps_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/detect"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "error": "scoring backend down" })),
        )
        .mount(&server)
        .await;

    let client = HttpDetector::new(server.uri(), "detect-key");
    let err = client.detect("Tea.").await.unwrap_err();

    match &err {
        DetectorError::Api { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "scoring backend down");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_transient());
}
