use super::harness::{GatewayHarness, MODEL, TOKEN};
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn names_stream_as_records_and_become_songs() {
    let gateway = GatewayHarness::start().await;
    gateway
        .stream_reply(&["```json\n{\"name\": \"Paper", " Moon\"}\n{\"name\":", " \"Tin Roof\"}\n```"])
        .await;

    let (status, records) = gateway
        .generate("names", &[("prompt", "song_names"), ("count", "2")])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Paper Moon");
    assert_eq!(records[1]["name"], "Tin Roof");
    assert!(records.iter().all(|record| record["id"].as_i64().is_some()));

    let requests = gateway.provider_requests().await;
    assert_eq!(requests.len(), 1);
    let messages = requests[0]["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
    assert!(
        messages[1]["content"]
            .as_str()
            .unwrap()
            .starts_with("Suggest 2 song names of 1-5 words.")
    );
}

#[tokio::test]
async fn lyrics_follow_ups_replay_the_conversation() {
    let gateway = GatewayHarness::start().await;
    gateway.stream_reply(&["{\"name\": \"Lanterns\"}\n"]).await;
    let (_, names) = gateway.generate("names", &[("prompt", "song_names")]).await;
    let song_id = names[0]["id"].as_i64().unwrap().to_string();

    gateway.stream_reply(&["{\"verse\": \"lights on the water\"}\n"]).await;
    let (status, first) = gateway.generate("lyrics", &[("song_id", &song_id)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first[0]["verse"], "lights on the water");

    gateway.stream_reply(&["{\"chorus\": \"carry me home\"}\n"]).await;
    let (_, second) = gateway.generate("lyrics", &[("song_id", &song_id)]).await;
    assert_eq!(second[0]["chorus"], "carry me home");

    let requests = gateway.provider_requests().await;
    let last: Vec<&str> = requests[2]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|message| message["role"].as_str().unwrap())
        .collect();
    assert_eq!(last, ["system", "user", "assistant", "user"]);
    assert_eq!(requests[2]["messages"][3]["content"], "Revise lyrics for Lanterns.");
    assert_eq!(requests[2]["model"], MODEL);

    let stats: Value = gateway
        .http
        .get(gateway.url(&format!("/api/songs/{song_id}/conversations/lyrics/stats")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["stats"]["user"], 2);
    assert_eq!(stats["stats"]["assistant"], 2);
    assert_eq!(stats["stats"]["has_incomplete"], false);
}

#[tokio::test]
async fn malformed_lines_and_provider_failures_stay_in_band() {
    let gateway = GatewayHarness::start().await;
    gateway.stream_reply(&["{\"name\": \"Good\"}\nnot json at all\n"]).await;

    let (status, records) = gateway.generate("names", &[("prompt", "song_names")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records[0]["name"], "Good");
    assert_eq!(records[1]["error"], "Malformed JSON line from LLM");
    assert_eq!(records[1]["raw_content"], "not json at all");

    // No mock left: the provider answers 404 and the failure is streamed.
    let (status, records) = gateway.generate("names", &[("prompt", "song_names")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["error"], "LLM stream failed");
    assert_eq!(records[0]["status"], "error");
}

#[tokio::test]
async fn request_after_failed_generation_starts_a_clean_thread() {
    let gateway = GatewayHarness::start().await;
    gateway.stream_reply(&["{\"name\": \"Static\"}\n"]).await;
    let (_, names) = gateway.generate("names", &[("prompt", "song_names")]).await;
    let song_id = names[0]["id"].as_i64().unwrap().to_string();

    // No mock mounted: the provider answers 404 and the user turn is left unanswered.
    let (_, failed) = gateway.generate("lyrics", &[("song_id", &song_id)]).await;
    assert_eq!(failed[0]["status"], "error");

    gateway.stream_reply(&["{\"verse\": \"second try\"}\n"]).await;
    let (status, records) = gateway.generate("lyrics", &[("song_id", &song_id)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records[0]["verse"], "second try");

    let requests = gateway.provider_requests().await;
    let last = requests.last().unwrap()["messages"].as_array().unwrap().clone();
    let roles: Vec<&str> = last.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["system", "user"]);
    assert_eq!(last[1]["content"], "Write lyrics for Static.");

    let stats: Value = gateway
        .http
        .get(gateway.url(&format!("/api/songs/{song_id}/conversations/lyrics/stats")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["stats"]["user"], 1);
    assert_eq!(stats["stats"]["assistant"], 1);
    assert_eq!(stats["stats"]["has_incomplete"], false);
}

#[tokio::test]
async fn word_suggestions_carry_their_position_and_keep_no_history() {
    let gateway = GatewayHarness::start().await;
    gateway.stream_reply(&["{\"name\": \"Wildfire\"}\n"]).await;
    let (_, names) = gateway.generate("names", &[("prompt", "song_names")]).await;
    let song_id = names[0]["id"].as_i64().unwrap().to_string();

    gateway.stream_reply(&["{\"word\": \"desire\"}\n{\"word\": \"higher\"}\n"]).await;
    let (status, words) = gateway
        .generate(
            "words",
            &[
                ("song_id", &song_id),
                ("rhyme_with", "fire"),
                ("count", "2"),
                ("word_line", "4"),
                ("word_index", "2"),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(words.len(), 2);
    assert_eq!(words[1], serde_json::json!({"word": "higher", "line": 4, "index": 2}));

    let requests = gateway.provider_requests().await;
    assert_eq!(
        requests[1]["messages"][1]["content"],
        "Suggest 2 words rhyming with fire for Wildfire."
    );

    let stats: Value = gateway
        .http
        .get(gateway.url(&format!("/api/songs/{song_id}/conversations/words/stats")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["stats"]["total"], 0);
}
