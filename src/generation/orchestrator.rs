use super::{Generator, GeneratorKind, UNEXPECTED_ERROR};
use crate::auth::Actor;
use crate::conversation::{
    ConversationBuilder, ConversationLogger, ConversationStore, SummarizationService,
};
use crate::error::{GenerationError, PromptError};
use crate::llm::types::{CompletionEvent, MessageRole, ModelConfig, SamplingParams};
use crate::llm::StreamingCompletionClient;
use crate::ndjson::{NdjsonProcessor, RecordTransform, trim_trailing_backticks};
use crate::prompt::PromptSource;
use crate::songs::SongStore;
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const MODEL_CONFIGURATION_ERROR: &str = "llm model configuration not found, please contact support";
pub const STREAM_FAILED_ERROR: &str = "LLM stream failed";

/// NDJSON lines of one running generation.
pub type GenerationStream = ReceiverStream<String>;

/// Everything a generation touches, shared across requests.
#[derive(Clone)]
pub struct GenerationServices {
    pub songs: Arc<dyn SongStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub summarizer: Arc<SummarizationService>,
    pub client: StreamingCompletionClient,
    pub prompts: Arc<dyn PromptSource>,
    pub logger: Arc<ConversationLogger>,
    /// Lines buffered ahead of a slow reader.
    pub stream_buffer: usize,
}

/// System and user prompt resolved for one call.
struct PreparedPrompt {
    conversation: ConversationBuilder,
    user_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

/// Drives a [`Generator`] from request validation to the persisted reply.
pub struct GenerationOrchestrator {
    services: GenerationServices,
}

impl GenerationOrchestrator {
    pub fn new(services: GenerationServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &GenerationServices {
        &self.services
    }

    /// Validate, authenticate and prepare, then start streaming.
    ///
    /// Every failure before the first line is returned as a
    /// [`GenerationError`]; later failures arrive in-band.
    pub async fn generate(
        &self,
        kind: GeneratorKind,
        params: &HashMap<String, String>,
        actor: Option<&Actor>,
    ) -> Result<GenerationStream, GenerationError> {
        let generator = kind.build(params).inspect_err(|error| {
            tracing::warn!(kind = %kind, error = %error, "rejected generation parameters");
        })?;
        self.start(generator, actor).await
    }

    pub async fn start(
        &self,
        generator: Arc<dyn Generator>,
        actor: Option<&Actor>,
    ) -> Result<GenerationStream, GenerationError> {
        let actor = actor.cloned().ok_or(GenerationError::Unauthorized)?;
        let model = resolve_model(&actor)?;

        let context = generator
            .load_context(self.services.songs.as_ref(), &actor)
            .await?;
        let prepared = self
            .build_prompt(generator.as_ref(), &actor, &model, context)
            .await?;

        tracing::info!(
            user = %actor.id,
            purpose = %generator.purpose(),
            song_id = generator.song_id(),
            prompt = generator.prompt_name(),
            model = %model.name,
            "starting generation"
        );

        let (tx, rx) = mpsc::channel(self.services.stream_buffer.max(1));
        let services = self.services.clone();
        tokio::spawn(async move {
            run_stream(services, generator, actor, model, prepared, tx).await;
        });
        Ok(ReceiverStream::new(rx))
    }

    async fn build_prompt(
        &self,
        generator: &dyn Generator,
        actor: &Actor,
        model: &ModelConfig,
        mut context: tera::Context,
    ) -> Result<PreparedPrompt, GenerationError> {
        let prompts = self.services.prompts.as_ref();
        let name = generator.prompt_name();

        let system = prompts
            .render_system_prompt(name, Some(&model.name))
            .map_err(prompt_failure)?;
        let mut conversation = ConversationBuilder::with_system(system);

        if generator.uses_conversation_history()
            && let Some(song_id) = generator.song_id()
        {
            let purpose = generator.purpose();
            // Turns left unanswered by an earlier request must not precede this one.
            self.services
                .conversations
                .cleanup_incomplete(song_id, purpose, &actor.id)
                .await;
            self.services
                .summarizer
                .maybe_summarize(song_id, purpose, actor)
                .await;
            if !conversation
                .hydrate(self.services.conversations.as_ref(), song_id, purpose, &actor.id)
                .await
            {
                tracing::warn!(song_id, purpose = %purpose, "continuing without conversation history");
            }
        }

        let follow_up = conversation.count_by_role(MessageRole::User) > 0;
        context.insert("follow_up", &follow_up);

        let user_prompt = prompts
            .render_prompt(name, Some(&model.name), &context)
            .map_err(prompt_failure)?;
        conversation.add_user(user_prompt.clone());

        Ok(PreparedPrompt {
            conversation,
            user_prompt,
        })
    }
}

fn resolve_model(actor: &Actor) -> Result<ModelConfig, GenerationError> {
    actor.model.clone().ok_or_else(|| {
        tracing::error!(kind = "configuration", user = %actor.id, "no generation model assigned");
        GenerationError::Configuration(MODEL_CONFIGURATION_ERROR.into())
    })
}

fn prompt_failure(error: PromptError) -> GenerationError {
    match error {
        PromptError::NotFound { .. } => error.into(),
        other => {
            tracing::error!(error = %other, "failed to build prompt");
            GenerationError::Internal(UNEXPECTED_ERROR.into())
        }
    }
}

/// Generator record hook bound to the request it serves.
struct GeneratorTransform<'a> {
    generator: &'a dyn Generator,
    songs: &'a dyn SongStore,
    actor: &'a Actor,
}

impl RecordTransform for GeneratorTransform<'_> {
    fn transform<'a>(
        &'a self,
        record: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        self.generator.preprocess_record(record, self.songs, self.actor)
    }
}

async fn run_stream(
    services: GenerationServices,
    generator: Arc<dyn Generator>,
    actor: Actor,
    model: ModelConfig,
    prepared: PreparedPrompt,
    tx: mpsc::Sender<String>,
) {
    let PreparedPrompt {
        mut conversation,
        user_prompt,
    } = prepared;
    let purpose = generator.purpose();
    let song_id = generator.song_id();
    let history_song = song_id.filter(|_| generator.uses_conversation_history());

    if let Some(song) = history_song
        && let Err(error) = services
            .conversations
            .save_user_message(&user_prompt, song, purpose, &actor.id)
            .await
    {
        tracing::warn!(song_id = song, purpose = %purpose, error = %error, "user turn not saved");
    }

    let sampling = SamplingParams {
        temperature: Some(model.temperature),
        max_tokens: Some(actor.effective_max_tokens(&model)),
    };
    let credential = services.client.resolve_credential(&actor, model.provider);
    let mut events = services
        .client
        .stream(conversation.serialize(), &model, sampling, credential);

    let transform = GeneratorTransform {
        generator: generator.as_ref(),
        songs: services.songs.as_ref(),
        actor: &actor,
    };
    let mut processor = NdjsonProcessor::new(Some(&transform));
    let mut outcome = Outcome::Completed;

    'events: loop {
        let event = tokio::select! {
            event = events.next() => event,
            () = tx.closed() => {
                outcome = Outcome::Cancelled;
                break;
            }
        };
        let Some(event) = event else {
            break;
        };
        match event {
            CompletionEvent::Text(fragment) => {
                for line in processor.feed(&fragment).await {
                    if tx.send(line).await.is_err() {
                        outcome = Outcome::Cancelled;
                        break 'events;
                    }
                }
            }
            CompletionEvent::Failed(details) => {
                tracing::error!(purpose = %purpose, song_id, details = %details, "generation stream failed");
                // The reader may already be gone; nothing else to do then.
                let _ = tx.send(stream_error_record(&details)).await;
                outcome = Outcome::Failed;
                break;
            }
        }
    }
    drop(events);

    if outcome == Outcome::Completed {
        for line in processor.finish().await {
            if tx.send(line).await.is_err() {
                outcome = Outcome::Cancelled;
                break;
            }
        }
    }

    let (records, errors) = (processor.records(), processor.errors());
    let reply = trim_trailing_backticks(processor.text()).into_owned();

    if let Some(song) = history_song
        && !reply.trim().is_empty()
        && let Err(error) = services
            .conversations
            .save_assistant_message(&reply, song, purpose, &actor.id)
            .await
    {
        tracing::warn!(song_id = song, purpose = %purpose, error = %error, "assistant turn not saved");
    }

    generator.on_complete(services.songs.as_ref(), &actor).await;
    // The response ends only once the turn is persisted.
    drop(tx);

    conversation.add_assistant(reply);
    let transcript = conversation.render();
    let logger = Arc::clone(&services.logger);
    let log = tokio::task::spawn_blocking(move || {
        logger.log_conversation(purpose.as_str(), song_id, &transcript);
    });
    if let Err(error) = log.await {
        tracing::warn!(error = %error, "conversation log task failed");
    }

    tracing::info!(
        user = %actor.id,
        purpose = %purpose,
        song_id,
        records,
        errors,
        outcome = %outcome,
        "generation finished"
    );
}

/// In-band failure record for a stream that already started.
pub fn stream_error_record(details: &str) -> String {
    format!(
        "{}\n",
        json!({
            "error": STREAM_FAILED_ERROR,
            "details": details,
            "status": "error",
        })
    )
}

/// Body of a pre-stream failure response.
pub fn error_body(error: &GenerationError) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
    })
}
