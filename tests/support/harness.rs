#![allow(dead_code)]

use serde_json::{Value, json};
use songsmith::config::{Config, UserConfig};
use songsmith::gateway::run_gateway_with_listener;
use songsmith::llm::{ModelConfig, ProviderKind};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "alice-token";
pub const MODEL: &str = "llama3";

const PROMPTS: &str = r#"
system_prompt: "You are a songwriting assistant. Reply with NDJSON only."
song_names: "Suggest {{ count }} song names of {{ min_words }}-{{ max_words }} words. Avoid: {{ exclude_song_names | join(sep=', ') }}"
song_lyrics: "{% if follow_up %}Revise{% else %}Write{% endif %} lyrics for {{ song_name }}."
song_words: "Suggest {{ count }} words rhyming with {{ rhyme_with }} for {{ song_name }}."
"#;

/// A gateway bound to an ephemeral port, talking to a mocked Ollama.
pub struct GatewayHarness {
    pub provider: MockServer,
    pub base_url: String,
    pub http: reqwest::Client,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    _workspace: TempDir,
}

impl GatewayHarness {
    pub async fn start() -> Self {
        let workspace = TempDir::new().expect("temp workspace should be created");
        let prompts = workspace.path().join("prompts");
        std::fs::create_dir_all(&prompts).expect("prompts dir should be created");
        std::fs::write(prompts.join("defaults.yaml"), PROMPTS).expect("prompts should be written");

        let provider = MockServer::start().await;
        let mut config = Config {
            workspace_dir: workspace.path().to_path_buf(),
            config_path: workspace.path().join("config.toml"),
            models: vec![ModelConfig::new(MODEL, ProviderKind::Ollama)],
            users: vec![UserConfig {
                id: "alice".into(),
                token: TOKEN.into(),
                model: Some(MODEL.into()),
                summarization_model: None,
                max_tokens: None,
                api_keys: Default::default(),
                include_themes: "[love]".into(),
                exclude_themes: String::new(),
            }],
            ..Config::default()
        };
        // Per-provider overrides bypass the process-wide Ollama default.
        config
            .completion
            .base_urls
            .insert("ollama".into(), format!("{}/v1", provider.uri()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral gateway listener should bind");
        let port = listener
            .local_addr()
            .expect("ephemeral gateway listener should expose local address")
            .port();
        let handle = tokio::spawn(async move { run_gateway_with_listener(listener, config).await });

        let harness = Self {
            provider,
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
            handle,
            _workspace: workspace,
        };
        harness.wait_until_ready().await;
        harness
    }

    async fn wait_until_ready(&self) {
        for _ in 0..100 {
            if let Ok(response) = self.http.get(self.url("/health")).send().await
                && response.status().is_success()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("gateway did not become ready");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Answer the next streaming request with `fragments` as SSE deltas.
    pub async fn stream_reply(&self, fragments: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"model": MODEL, "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(fragments), "text/event-stream"))
            .up_to_n_times(1)
            .mount(&self.provider)
            .await;
    }

    /// Answer non-streaming requests (summaries) with `text`.
    pub async fn complete_reply(&self, text: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": text}}]})),
            )
            .mount(&self.provider)
            .await;
    }

    pub async fn generate(&self, kind: &str, query: &[(&str, &str)]) -> (reqwest::StatusCode, Vec<Value>) {
        let response = self
            .http
            .get(self.url(&format!("/api/generate/{kind}")))
            .bearer_auth(TOKEN)
            .query(query)
            .send()
            .await
            .expect("generate request should complete");
        let status = response.status();
        let body = response.text().await.expect("body should be readable");
        let records = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("every streamed line is JSON"))
            .collect();
        (status, records)
    }

    /// Chat messages the provider received, oldest request first.
    pub async fn provider_requests(&self) -> Vec<Value> {
        self.provider
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).expect("provider body is JSON"))
            .collect()
    }
}

impl Drop for GatewayHarness {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = json!({"choices": [{"delta": {"content": fragment}}]});
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
