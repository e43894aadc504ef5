use super::traits::CompletionBackend;
use super::types::{
    ChatMessage, CompletionEvent, CompletionRequest, ModelConfig, ProviderKind, SamplingParams,
};
use crate::auth::Actor;
use crate::config::CompletionConfig;
use crate::error::CompletionError;
use futures_util::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Incremental completion output. Always ends normally; failures arrive as a
/// single terminal [`CompletionEvent::Failed`].
pub type CompletionStream = Pin<Box<dyn Stream<Item = CompletionEvent> + Send + 'static>>;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

static OLLAMA_BASE_URL: OnceLock<String> = OnceLock::new();

/// Process-wide local inference endpoint. The first caller decides; later
/// configuration is ignored.
pub fn ollama_base_url(configured: Option<&str>) -> &'static str {
    OLLAMA_BASE_URL.get_or_init(|| {
        configured
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_OLLAMA_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    })
}

/// Resolves the OpenAI-compatible base URL per provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderEndpoints {
    overrides: BTreeMap<String, String>,
    ollama: Option<String>,
}

impl ProviderEndpoints {
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            overrides: config.base_urls.clone(),
            ollama: config.ollama_base_url.clone(),
        }
    }

    pub fn with_override(mut self, provider: ProviderKind, base_url: impl Into<String>) -> Self {
        self.overrides
            .insert(provider.as_str().to_string(), base_url.into());
        self
    }

    pub fn base_url(&self, provider: ProviderKind) -> String {
        if let Some(url) = self.overrides.get(provider.as_str()) {
            return url.clone();
        }
        match provider {
            ProviderKind::OpenAi => "https://api.openai.com/v1".into(),
            ProviderKind::Anthropic => "https://api.anthropic.com/v1".into(),
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
            ProviderKind::Ollama => format!("{}/v1", ollama_base_url(self.ollama.as_deref())),
        }
    }
}

/// Outbound call to the actor's model: credentials, sampling policy, and
/// failure shaping around a [`CompletionBackend`].
#[derive(Clone)]
pub struct StreamingCompletionClient {
    backend: Arc<dyn CompletionBackend>,
    endpoints: ProviderEndpoints,
    env: EnvLookup,
}

impl StreamingCompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, endpoints: ProviderEndpoints) -> Self {
        Self {
            backend,
            endpoints,
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the process environment used for fallback keys.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Actor's stored key, then the provider's environment variable, then none.
    pub fn resolve_credential(&self, actor: &Actor, provider: ProviderKind) -> Option<String> {
        actor
            .api_key(provider)
            .map(ToString::to_string)
            .or_else(|| {
                provider
                    .env_key_var()
                    .and_then(|var| (self.env)(var))
                    .filter(|key| !key.trim().is_empty())
            })
    }

    fn prepare(
        &self,
        messages: Vec<ChatMessage>,
        model: &ModelConfig,
        sampling: SamplingParams,
        credential: Option<String>,
    ) -> Result<CompletionRequest, CompletionError> {
        if credential.is_none() && model.provider.requires_credential() {
            return Err(CompletionError::MissingCredential {
                provider: model.provider.to_string(),
            });
        }

        let sampling = SamplingParams {
            temperature: sampling.temperature.filter(|_| model.supports_temperature),
            max_tokens: sampling.max_tokens,
        };

        Ok(CompletionRequest {
            provider: model.provider,
            base_url: self.endpoints.base_url(model.provider),
            api_key: credential,
            model: model.name.clone(),
            messages,
            sampling,
        })
    }

    /// Start a streamed completion. Never fails: setup, connection, status,
    /// and mid-stream errors all become one terminal `Failed` event.
    pub fn stream(
        &self,
        messages: Vec<ChatMessage>,
        model: &ModelConfig,
        sampling: SamplingParams,
        credential: Option<String>,
    ) -> CompletionStream {
        let prepared = self.prepare(messages, model, sampling, credential);
        let backend = Arc::clone(&self.backend);
        let model_name = model.name.clone();

        Box::pin(async_stream::stream! {
            let request = match prepared {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(model = %model_name, error = %err, "completion setup failed");
                    yield CompletionEvent::Failed(err.to_string());
                    return;
                }
            };
            let provider = request.provider;

            let mut inner = match backend.stream_chat(request).await {
                Ok(inner) => inner,
                Err(err) => {
                    tracing::warn!(%provider, model = %model_name, error = %err, "completion request failed");
                    yield CompletionEvent::Failed(err.to_string());
                    return;
                }
            };

            while let Some(item) = inner.next().await {
                match item {
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => {
                        yield CompletionEvent::Text(text);
                    }
                    Err(err) => {
                        tracing::warn!(%provider, model = %model_name, error = %err, "completion stream interrupted");
                        yield CompletionEvent::Failed(err.to_string());
                        return;
                    }
                }
            }
        })
    }

    /// Non-streaming completion used for summaries.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        model: &ModelConfig,
        sampling: SamplingParams,
        credential: Option<String>,
    ) -> anyhow::Result<String> {
        let request = self.prepare(messages, model, sampling, credential)?;
        self.backend.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;

    fn actor_with_key(provider: &str, key: &str) -> Actor {
        let mut actor = Actor::new("alice");
        actor.api_keys.insert(provider.to_string(), key.to_string());
        actor
    }

    fn client(backend: Arc<ScriptedBackend>) -> StreamingCompletionClient {
        StreamingCompletionClient::new(backend, ProviderEndpoints::default())
            .with_env_lookup(|key| (key == "OPENAI_API_KEY").then(|| "sk-env".to_string()))
    }

    async fn collect(stream: CompletionStream) -> Vec<CompletionEvent> {
        stream.collect().await
    }

    #[test]
    fn actor_key_wins_over_environment() {
        let client = client(Arc::new(ScriptedBackend::new(vec![])));
        let actor = actor_with_key("openai", "sk-user");
        assert_eq!(
            client.resolve_credential(&actor, ProviderKind::OpenAi).as_deref(),
            Some("sk-user")
        );
    }

    #[test]
    fn environment_key_is_the_fallback() {
        let client = client(Arc::new(ScriptedBackend::new(vec![])));
        let actor = Actor::new("bob");
        assert_eq!(
            client.resolve_credential(&actor, ProviderKind::OpenAi).as_deref(),
            Some("sk-env")
        );
        assert_eq!(client.resolve_credential(&actor, ProviderKind::Gemini), None);
    }

    #[test]
    fn endpoint_overrides_take_precedence() {
        let endpoints = ProviderEndpoints::default()
            .with_override(ProviderKind::OpenAi, "http://127.0.0.1:9/v1");
        assert_eq!(endpoints.base_url(ProviderKind::OpenAi), "http://127.0.0.1:9/v1");
        assert_eq!(
            endpoints.base_url(ProviderKind::Anthropic),
            "https://api.anthropic.com/v1"
        );
        assert!(endpoints.base_url(ProviderKind::Ollama).ends_with("/v1"));
    }

    #[tokio::test]
    async fn text_fragments_pass_through() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("Hel".into()),
            Ok(String::new()),
            Ok("lo".into()),
        ]));
        let model = ModelConfig::new("gpt-4o-mini", ProviderKind::OpenAi);
        let events = collect(client(backend).stream(
            vec![ChatMessage::user("hi")],
            &model,
            model.sampling(),
            Some("sk".into()),
        ))
        .await;
        assert_eq!(
            events,
            vec![
                CompletionEvent::Text("Hel".into()),
                CompletionEvent::Text("lo".into())
            ]
        );
    }

    #[tokio::test]
    async fn temperature_dropped_for_models_without_sampling_control() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let mut model = ModelConfig::new("o3-mini", ProviderKind::OpenAi);
        model.supports_temperature = false;
        collect(client(Arc::clone(&backend)).stream(
            vec![],
            &model,
            model.sampling(),
            Some("sk".into()),
        ))
        .await;

        let request = backend.last_request().unwrap();
        assert_eq!(request.sampling.temperature, None);
        assert_eq!(request.sampling.max_tokens, Some(model.max_tokens));
    }

    #[tokio::test]
    async fn connection_failure_is_a_single_terminal_event() {
        let mut backend = ScriptedBackend::new(vec![Ok("never".into())]);
        backend.fail_on_start = Some("connection refused".into());
        let model = ModelConfig::new("llama3", ProviderKind::Ollama);
        let events = collect(client(Arc::new(backend)).stream(
            vec![],
            &model,
            model.sampling(),
            None,
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CompletionEvent::Failed(msg) if msg.contains("connection refused")));
    }

    #[tokio::test]
    async fn mid_stream_error_stops_iteration() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("partial".into()),
            Err("timeout".into()),
            Ok("lost".into()),
        ]));
        let model = ModelConfig::new("claude-3-5-haiku", ProviderKind::Anthropic);
        let events = collect(client(backend).stream(
            vec![],
            &model,
            model.sampling(),
            Some("key".into()),
        ))
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], CompletionEvent::Failed(msg) if msg.contains("timeout")));
    }

    #[tokio::test]
    async fn missing_credential_fails_in_band() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("x".into())]));
        let model = ModelConfig::new("gemini-1.5-flash", ProviderKind::Gemini);
        let events = collect(client(Arc::clone(&backend)).stream(
            vec![],
            &model,
            model.sampling(),
            None,
        ))
        .await;
        assert!(matches!(&events[..], [CompletionEvent::Failed(msg)] if msg.contains("gemini")));
        assert!(backend.last_request().is_none());
    }
}
