//! OpenAI-compatible `/chat/completions` backend.
//! OpenAI, Anthropic, Gemini and Ollama all expose this wire format, so one
//! implementation serves every provider in the model catalog.

use super::scrub::sanitize_api_error;
use super::sse::{SseBuffer, data_payloads};
use super::traits::{CompletionBackend, TextStream};
use super::types::{ChatMessage, CompletionRequest, ProviderKind};
use crate::config::CompletionConfig;
use crate::error::CompletionError;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

pub struct HttpCompletionBackend {
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl HttpCompletionBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &CompletionConfig) -> Self {
        Self::new(super::http_client::build_provider_client_with_timeout(
            config.request_timeout_secs,
            config.connect_timeout_secs,
        ))
    }

    fn chat_completions_url(base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if base.ends_with("chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    fn build_body(request: &CompletionRequest, stream: bool) -> ChatRequest<'_> {
        // OpenAI reasoning models reject `max_tokens`.
        let (max_tokens, max_completion_tokens) = match request.provider {
            ProviderKind::OpenAi => (None, request.sampling.max_tokens),
            _ => (request.sampling.max_tokens, None),
        };
        ChatRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.sampling.temperature,
            max_tokens,
            max_completion_tokens,
            stream,
        }
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let provider = request.provider.as_str();
        let mut builder = self
            .client
            .post(Self::chat_completions_url(&request.base_url))
            .json(&Self::build_body(request, stream));
        if let Some(key) = &request.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|err| CompletionError::Request {
            provider: provider.to_string(),
            message: sanitize_api_error(&err.to_string()),
        })?;

        if !response.status().is_success() {
            return Err(api_error(provider, response).await);
        }
        Ok(response)
    }

    async fn stream_impl(&self, request: CompletionRequest) -> Result<TextStream> {
        let provider = request.provider;
        let response = self.send(&request, true).await?;
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut sse_buffer = SseBuffer::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result.map_err(|err| CompletionError::Streaming(
                    sanitize_api_error(&err.to_string()),
                ))?;
                sse_buffer.push_chunk(&chunk);

                while let Some(event_block) = sse_buffer.next_event_block() {
                    for data in data_payloads(&event_block) {
                        if let Some(text) = parse_chunk(provider, data)? {
                            yield text;
                        }
                    }
                }
            }

            if let Some(tail) = sse_buffer.take_remainder() {
                for data in data_payloads(&tail) {
                    if let Some(text) = parse_chunk(provider, data)? {
                        yield text;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete_impl(&self, request: CompletionRequest) -> Result<String> {
        let provider = request.provider.as_str();
        let response = self.send(&request, false).await?;
        let body: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("{provider} response JSON decode failed"))?;

        body.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                CompletionError::Empty {
                    provider: provider.to_string(),
                }
                .into()
            })
    }
}

/// Text carried by one SSE `data:` payload. Unparseable keep-alive payloads
/// are skipped; an in-band provider error ends the stream.
fn parse_chunk(provider: ProviderKind, data: &str) -> Result<Option<String>> {
    let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(data) else {
        return Ok(None);
    };

    if let Some(error) = chunk.error {
        return Err(CompletionError::Streaming(format!(
            "{provider} stream error: {}",
            sanitize_api_error(&error.to_string())
        ))
        .into());
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok((!text.is_empty()).then_some(text))
}

/// Build a sanitized provider error from a failed HTTP response.
async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    CompletionError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
        body: sanitize_api_error(&body),
    }
    .into()
}

impl CompletionBackend for HttpCompletionBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TextStream>> + Send + '_>> {
        Box::pin(self.stream_impl(request))
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(self.complete_impl(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::SamplingParams;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(base_url: &str, provider: ProviderKind, key: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            provider,
            base_url: base_url.to_string(),
            api_key: key.map(ToString::to_string),
            model: "test-model".into(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
            sampling: SamplingParams {
                temperature: Some(0.5),
                max_tokens: Some(256),
            },
        }
    }

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            let chunk = serde_json::json!({"choices": [{"delta": {"content": fragment}}]});
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn chat_url_appends_path_once() {
        assert_eq!(
            HttpCompletionBackend::chat_completions_url("http://localhost:11434/v1/"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            HttpCompletionBackend::chat_completions_url("https://x/v1/chat/completions"),
            "https://x/v1/chat/completions"
        );
    }

    #[test]
    fn body_omits_temperature_when_unset() {
        let mut req = request("http://x", ProviderKind::Anthropic, None);
        req.sampling.temperature = None;
        let json = serde_json::to_value(HttpCompletionBackend::build_body(&req, true)).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn openai_body_uses_max_completion_tokens() {
        let req = request("http://x", ProviderKind::OpenAi, None);
        let json = serde_json::to_value(HttpCompletionBackend::build_body(&req, false)).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["max_completion_tokens"], 256);
    }

    #[test]
    fn in_band_provider_error_fails_the_chunk() {
        let err = parse_chunk(
            ProviderKind::Gemini,
            r#"{"error":{"message":"quota exceeded"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(parse_chunk(ProviderKind::Gemini, ": keep-alive").unwrap(), None);
    }

    #[tokio::test]
    async fn streams_text_fragments_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["{\"a\":", "1}\n", "{\"b\":2}"])),
            )
            .mount(&server)
            .await;

        let backend = HttpCompletionBackend::new(Client::new());
        let stream = backend
            .stream_chat(request(&server.uri(), ProviderKind::Anthropic, Some("sk-test")))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["{\"a\":", "1}\n", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn error_status_is_sanitized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                "{\"error\":\"invalid key sk-proj-raw-secret-123\"}",
            ))
            .mount(&server)
            .await;

        let backend = HttpCompletionBackend::new(Client::new());
        let err = match backend
            .stream_chat(request(&server.uri(), ProviderKind::OpenAi, Some("k")))
            .await
        {
            Ok(_) => panic!("401 should fail before streaming"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("401"));
        assert!(!err.contains("raw-secret-123"));
    }

    #[tokio::test]
    async fn complete_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "A short summary."}}]
            })))
            .mount(&server)
            .await;

        let backend = HttpCompletionBackend::new(Client::new());
        let text = backend
            .complete(request(&server.uri(), ProviderKind::Ollama, None))
            .await
            .unwrap();
        assert_eq!(text, "A short summary.");
    }

    #[tokio::test]
    async fn complete_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let backend = HttpCompletionBackend::new(Client::new());
        let err = backend
            .complete(request(&server.uri(), ProviderKind::Ollama, None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }
}
