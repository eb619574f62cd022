use pincel_core::{GeminiClient, GenerationProvider, RemoteError, ResponsePart};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key")
        .with_base_url(&server.uri())
        .with_models("chat-model", "edit-model", "image-model")
}

#[tokio::test]
async fn converse_returns_joined_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/chat-model:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hi " }, { "text": "there" }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let parts = client_for(&server).converse("hello").await.unwrap();
    assert_eq!(parts, vec![ResponsePart::Text("Hi there".to_string())]);
}

#[tokio::test]
async fn converse_with_no_candidates_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/chat-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let parts = client_for(&server).converse("hello").await.unwrap();
    assert!(parts.is_empty());
}

#[tokio::test]
async fn edit_sends_inline_image_and_keeps_mixed_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/edit-model:generateContent"))
        .and(body_partial_json(json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": "AQID" } },
                    { "text": "add a hat" }
                ]
            }],
            "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "BAUG" } }
                ] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let parts = client_for(&server)
        .edit("add a hat", &[1, 2, 3], "image/jpeg")
        .await
        .unwrap();
    assert_eq!(
        parts,
        vec![
            ResponsePart::Text("Here you go".to_string()),
            ResponsePart::InlineData {
                mime_type: "image/png".to_string(),
                data: "BAUG".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn generate_maps_first_prediction_to_png() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/image-model:predict"))
        .and(body_partial_json(json!({
            "instances": [{ "prompt": "a red fox" }],
            "parameters": { "sampleCount": 1, "outputMimeType": "image/png" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [{ "bytesBase64Encoded": "AQID" }]
        })))
        .mount(&server)
        .await;

    let parts = client_for(&server).generate("a red fox").await.unwrap();
    assert_eq!(
        parts,
        vec![ResponsePart::InlineData {
            mime_type: "image/png".to_string(),
            data: "AQID".to_string(),
        }]
    );
}

#[tokio::test]
async fn http_errors_carry_the_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/image-model:predict"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("a cat").await.unwrap_err();
    match err {
        RemoteError::Http { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "Quota exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/chat-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).converse("hello").await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed(_)));
}
