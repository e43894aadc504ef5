use super::harness::GatewayHarness;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn health_is_public() {
    let gateway = GatewayHarness::start().await;
    let body: Value = gateway
        .http
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_routes_require_a_known_bearer_token() {
    let gateway = GatewayHarness::start().await;

    let missing = gateway
        .http
        .get(gateway.url("/api/generate/names?prompt=song_names"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "authentication required");

    let wrong = gateway
        .http
        .get(gateway.url("/api/songs/1/conversations/lyrics/stats"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    assert!(gateway.provider_requests().await.is_empty());
}

#[tokio::test]
async fn validation_errors_are_reported_before_streaming() {
    let gateway = GatewayHarness::start().await;

    let (status, body) = gateway.generate("names", &[("prompt", "song_names"), ("count", "many")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body[0]["error"], "count must be a valid number");

    let (status, _) = gateway.generate("lyrics", &[("song_id", "999")]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = gateway.generate("choruses", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
