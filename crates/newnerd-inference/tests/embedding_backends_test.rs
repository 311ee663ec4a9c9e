//! HTTP-level tests for the embedding backends against a wiremock server.

#![cfg(all(feature = "gemini", feature = "openai"))]

use newnerd_core::{EmbeddingBackend, Error};
use newnerd_inference::gemini::{GeminiBackend, GeminiConfig};
use newnerd_inference::openai::{OpenAIBackend, OpenAIConfig};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gemini_config(server: &MockServer, dimension: usize) -> GeminiConfig {
    GeminiConfig {
        base_url: format!("{}/v1beta", server.uri()),
        api_key: Some("g-key".to_string()),
        embed_model: "text-embedding-004".to_string(),
        embed_dimension: dimension,
        timeout_seconds: 5,
    }
}

fn openai_config(server: &MockServer, dimension: usize) -> OpenAIConfig {
    OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("sk-test".to_string()),
        embed_model: "text-embedding-3-small".to_string(),
        embed_dimension: dimension,
        timeout_seconds: 5,
    }
}

#[tokio::test]
async fn test_gemini_sends_key_and_content_parts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:embedContent"))
        .and(query_param("key", "g-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "models/text-embedding-004",
            "content": { "parts": [{ "text": "fotossíntese" }] }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embedding": { "values": [0.1, 0.2, 0.3] } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(gemini_config(&server, 3)).unwrap();
    let vectors = backend
        .embed_texts(&["fotossíntese".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].as_slice(), &[0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn test_gemini_one_request_per_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:embedContent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embedding": { "values": [1.0, 0.0] } })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(gemini_config(&server, 2)).unwrap();
    let texts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    let vectors = backend.embed_texts(&texts).await.unwrap();
    assert_eq!(vectors.len(), 3);
}

#[tokio::test]
async fn test_gemini_dimension_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embedding": { "values": [0.5, 0.5] } })),
        )
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(gemini_config(&server, 768)).unwrap();
    let err = backend.embed_texts(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(ref m) if m.contains("768")));
}

#[tokio::test]
async fn test_gemini_missing_values_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(gemini_config(&server, 3)).unwrap();
    let err = backend.embed_texts(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}

#[tokio::test]
async fn test_gemini_quota_error_is_classified() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(gemini_config(&server, 3)).unwrap();
    let err = backend.embed_texts(&["x".to_string()]).await.unwrap_err();
    match err {
        Error::Embedding(msg) => {
            assert!(msg.contains("rate limit"), "unexpected message: {}", msg);
            assert!(msg.contains("Quota exceeded"));
        }
        other => panic!("expected embedding error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gemini_bad_key_maps_to_config_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": { "code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED" }
        })))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(gemini_config(&server, 3)).unwrap();
    let err = backend.embed_texts(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_openai_sends_bearer_and_sorts_by_index() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "model": "text-embedding-3-small",
            "input": ["primeiro", "segundo"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                { "embedding": [0.0, 1.0], "index": 1 },
                { "embedding": [1.0, 0.0], "index": 0 }
            ],
            "model": "text-embedding-3-small",
            "usage": { "prompt_tokens": 2, "total_tokens": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(openai_config(&server, 2)).unwrap();
    let vectors = backend
        .embed_texts(&["primeiro".to_string(), "segundo".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors[0].as_slice(), &[1.0, 0.0]);
    assert_eq!(vectors[1].as_slice(), &[0.0, 1.0]);
}

#[tokio::test]
async fn test_openai_count_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{ "embedding": [1.0, 0.0], "index": 0 }],
            "model": "text-embedding-3-small"
        })))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(openai_config(&server, 2)).unwrap();
    let err = backend
        .embed_texts(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}

#[tokio::test]
async fn test_openai_auth_error_maps_to_config_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(openai_config(&server, 2)).unwrap();
    let err = backend.embed_texts(&["a".to_string()]).await.unwrap_err();
    match err {
        Error::Config(msg) => assert!(msg.contains("Incorrect API key")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_server_error_with_non_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(openai_config(&server, 2)).unwrap();
    let err = backend.embed_texts(&["a".to_string()]).await.unwrap_err();
    match err {
        Error::Embedding(msg) => assert!(msg.contains("503")),
        other => panic!("expected embedding error, got {:?}", other),
    }
}
