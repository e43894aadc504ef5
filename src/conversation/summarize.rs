use super::store::{ConversationStore, FlagRefresh};
use super::token_estimate::{TiktokenCounter, TokenCounter};
use super::types::{ConversationStats, Message, Purpose};
use crate::auth::{Actor, ActorDirectory};
use crate::config::SummarizationConfig;
use crate::llm::types::{ChatMessage, ModelConfig, SamplingParams};
use crate::llm::StreamingCompletionClient;
use crate::prompt::PromptSource;
use crate::songs::SongStore;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Conversations with fewer active messages are never summarized.
const MIN_MESSAGES: usize = 3;

/// Before/after view of one forced summarization.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub song_id: i64,
    pub purpose: Purpose,
    pub summarized: bool,
    pub before: ConversationStats,
    pub after: ConversationStats,
    pub needs_summarization: bool,
}

/// Collapses long conversations into a single summary message and keeps
/// the song-level `needs_summarization` flag current.
pub struct SummarizationService {
    store: Arc<dyn ConversationStore>,
    songs: Arc<dyn SongStore>,
    client: StreamingCompletionClient,
    prompts: Arc<dyn PromptSource>,
    counter: Arc<dyn TokenCounter>,
    settings: SummarizationConfig,
}

impl SummarizationService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        songs: Arc<dyn SongStore>,
        client: StreamingCompletionClient,
        prompts: Arc<dyn PromptSource>,
        settings: SummarizationConfig,
    ) -> Self {
        Self {
            store,
            songs,
            client,
            prompts,
            counter: Arc::new(TiktokenCounter),
            settings,
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn estimate_conversation_tokens(&self, messages: &[Message], model_hint: &str) -> usize {
        messages
            .iter()
            .map(|message| self.counter.estimate(&message.content, model_hint))
            .sum()
    }

    /// Token ceiling for one conversation, or `None` when the actor has no
    /// model to measure against.
    pub fn budget_for(&self, actor: &Actor) -> Option<u64> {
        let model = actor.model.as_ref()?;
        Some(model.context_window_tokens.unwrap_or_else(|| {
            self.settings
                .budget_multiplier
                .saturating_mul(u64::from(actor.effective_max_tokens(model)))
        }))
    }

    pub async fn needs_summarization(&self, song_id: i64, purpose: Purpose, actor: &Actor) -> bool {
        let Some(budget) = self.budget_for(actor) else {
            return false;
        };
        let model_hint = actor.model.as_ref().map_or("", |m| m.name.as_str());

        let messages = match self.store.active_messages(song_id, purpose, &actor.id).await {
            Ok(messages) => messages,
            Err(error) => {
                tracing::error!(song_id, purpose = %purpose, error = %error, "failed to load messages for summarization check");
                return false;
            }
        };
        if messages.is_empty() {
            return false;
        }

        let tokens = self.estimate_conversation_tokens(&messages, model_hint) as u64;
        let needed = tokens > budget;
        tracing::debug!(song_id, purpose = %purpose, tokens, budget, needed, "conversation size check");
        needed
    }

    /// Replace the active `purpose` history with one summary message.
    pub async fn summarize(&self, song_id: i64, purpose: Purpose, actor: &Actor) -> bool {
        let messages = match self.store.active_messages(song_id, purpose, &actor.id).await {
            Ok(messages) => messages,
            Err(error) => {
                tracing::error!(song_id, purpose = %purpose, error = %error, "failed to load messages to summarize");
                return false;
            }
        };
        if messages.len() < MIN_MESSAGES {
            tracing::info!(song_id, purpose = %purpose, count = messages.len(), "too few messages to summarize");
            return false;
        }

        let Some(model) = actor.summarizer_model() else {
            tracing::error!(song_id, kind = "configuration", user = %actor.id, "no model available for summarization");
            return false;
        };

        let content = transcript(&messages);
        tracing::info!(
            song_id,
            purpose = %purpose,
            messages = messages.len(),
            chars = content.len(),
            model = %model.name,
            "summarizing conversation"
        );

        let Some(summary) = self.call_summarizer(&content, purpose, model, actor).await else {
            return false;
        };

        let superseded: Vec<String> = messages.into_iter().map(|message| message.id).collect();
        match self
            .store
            .replace_with_summary(song_id, &superseded, &summary)
            .await
        {
            Ok(inserted) => {
                tracing::info!(song_id, purpose = %purpose, summary_id = %inserted.id, deactivated = superseded.len(), "conversation summarized");
            }
            Err(error) => {
                tracing::error!(song_id, purpose = %purpose, error = %error, "failed to persist summary");
                return false;
            }
        }

        self.update_song_flag(song_id, actor, None).await;
        true
    }

    async fn call_summarizer(
        &self,
        content: &str,
        purpose: Purpose,
        model: &ModelConfig,
        actor: &Actor,
    ) -> Option<String> {
        let mut context = tera::Context::new();
        context.insert("conversation_content", content);
        context.insert("conversation_type", purpose.as_str());

        let prompts = self
            .prompts
            .render_system_prompt("chat_summary", Some(&model.name))
            .and_then(|system| {
                let user = self.prompts.render_prompt(
                    &format!("{purpose}_summary"),
                    Some(&model.name),
                    &context,
                )?;
                Ok((system, user))
            });
        let (system, user) = match prompts {
            Ok(pair) => pair,
            Err(error) => {
                tracing::error!(purpose = %purpose, error = %error, "failed to load summarization prompts");
                return None;
            }
        };

        let sampling = SamplingParams {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_output_tokens),
        };
        let credential = self.client.resolve_credential(actor, model.provider);
        let reply = self
            .client
            .complete(
                vec![ChatMessage::system(system), ChatMessage::user(user)],
                model,
                sampling,
                credential,
            )
            .await;

        match reply {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                tracing::error!(purpose = %purpose, model = %model.name, "summarizer returned no text");
                None
            }
            Err(error) => {
                tracing::error!(purpose = %purpose, model = %model.name, error = %error, "summarization call failed");
                None
            }
        }
    }

    /// Recompute (or set) the song flag and persist it if it changed.
    /// Returns the resulting value; `false` for songs the actor does not own.
    pub async fn update_song_flag(&self, song_id: i64, actor: &Actor, explicit: Option<bool>) -> bool {
        let song = match self.songs.get_song(song_id, &actor.id).await {
            Ok(Some(song)) => song,
            Ok(None) => {
                tracing::warn!(song_id, user = %actor.id, "flag update for unknown song");
                return false;
            }
            Err(error) => {
                tracing::error!(song_id, error = %error, "failed to load song for flag update");
                return false;
            }
        };

        let value = match explicit {
            Some(value) => value,
            None => {
                let mut any = false;
                for purpose in Purpose::SUMMARIZABLE {
                    if self.needs_summarization(song_id, purpose, actor).await {
                        any = true;
                        break;
                    }
                }
                any
            }
        };

        if value != song.needs_summarization {
            match self.songs.set_needs_summarization(song_id, value).await {
                Ok(_) => tracing::info!(song_id, needs_summarization = value, "updated summarization flag"),
                Err(error) => {
                    tracing::error!(song_id, error = %error, "failed to persist summarization flag");
                }
            }
        }
        value
    }

    /// Summarize inline when `purpose` has outgrown its budget.
    pub async fn maybe_summarize(&self, song_id: i64, purpose: Purpose, actor: &Actor) -> bool {
        if !Purpose::SUMMARIZABLE.contains(&purpose) {
            return false;
        }
        if !self.needs_summarization(song_id, purpose, actor).await {
            return false;
        }
        tracing::info!(song_id, purpose = %purpose, "conversation over budget; summarizing before generation");
        self.summarize(song_id, purpose, actor).await
    }

    /// Summarize regardless of budget and report stats around it.
    pub async fn force(&self, song_id: i64, purpose: Purpose, actor: &Actor) -> SummaryReport {
        let before = self.store.get_stats(song_id, purpose, &actor.id).await;
        let summarized = self.summarize(song_id, purpose, actor).await;
        let after = self.store.get_stats(song_id, purpose, &actor.id).await;
        let needs_summarization = self.needs_summarization(song_id, purpose, actor).await;

        SummaryReport {
            song_id,
            purpose,
            summarized,
            before,
            after,
            needs_summarization,
        }
    }
}

/// `ROLE: content` blocks separated by blank lines.
fn transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let _ = write!(
            out,
            "{}: {}\n\n",
            message.role.as_str().to_ascii_uppercase(),
            message.content
        );
    }
    out
}

/// Consume flag refresh requests queued by the store after assistant saves.
/// Owners are resolved through `directory`; unknown owners are skipped.
pub fn spawn_flag_refresher(
    service: Arc<SummarizationService>,
    directory: Arc<ActorDirectory>,
) -> (mpsc::UnboundedSender<FlagRefresh>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<FlagRefresh>();
    let handle = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let Some(actor) = directory.find_by_id(&request.owner) else {
                tracing::debug!(owner = %request.owner, "flag refresh for unknown owner");
                continue;
            };
            service.update_song_flag(request.song_id, &actor, None).await;
        }
        tracing::debug!("flag refresh worker stopped");
    });
    (tx, handle)
}
