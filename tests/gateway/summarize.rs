use super::harness::{GatewayHarness, TOKEN};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
async fn forced_summary_replaces_the_lyrics_conversation() {
    let gateway = GatewayHarness::start().await;
    gateway.stream_reply(&["{\"name\": \"Driftwood\"}\n"]).await;
    let (_, names) = gateway.generate("names", &[("prompt", "song_names")]).await;
    let song_id = names[0]["id"].as_i64().unwrap();

    for reply in ["{\"verse\": \"salt and cedar\"}\n", "{\"chorus\": \"grey gulls\"}\n"] {
        gateway.stream_reply(&[reply]).await;
        gateway.generate("lyrics", &[("song_id", &song_id.to_string())]).await;
    }
    gateway.complete_reply("They are writing a coastal ballad.").await;

    let response = gateway
        .http
        .post(gateway.url("/api/summarize"))
        .bearer_auth(TOKEN)
        .json(&json!({"song_id": song_id, "purpose": "lyrics"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["report"]["before"]["total"], 4);
    assert_eq!(body["report"]["after"]["total"], 0);
    assert_eq!(body["report"]["after"]["has_summaries"], true);

    gateway.stream_reply(&["{\"bridge\": \"low tide\"}\n"]).await;
    gateway.generate("lyrics", &[("song_id", &song_id.to_string())]).await;
    let requests = gateway.provider_requests().await;
    let replay = &requests.last().unwrap()["messages"];
    assert_eq!(replay[1]["role"], "assistant");
    assert!(
        replay[1]["content"]
            .as_str()
            .unwrap()
            .ends_with("They are writing a coastal ballad.")
    );
}

#[tokio::test]
async fn hooks_are_not_summarized() {
    let gateway = GatewayHarness::start().await;
    let response = gateway
        .http
        .post(gateway.url("/api/summarize"))
        .bearer_auth(TOKEN)
        .json(&json!({"song_id": 1, "purpose": "hook"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
