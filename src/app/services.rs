use crate::auth::ActorDirectory;
use crate::config::Config;
use crate::conversation::{
    ConversationLogger, ConversationStore, SqliteConversationStore, SummarizationService,
    spawn_flag_refresher,
};
use crate::db;
use crate::generation::{GenerationOrchestrator, GenerationServices};
use crate::llm::{CompletionBackend, HttpCompletionBackend, ProviderEndpoints, StreamingCompletionClient};
use crate::prompt::{PromptSource, YamlPromptLibrary};
use crate::songs::{SongStore, SqliteSongStore};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Long-lived components wired from one [`Config`].
pub struct Services {
    pub songs: Arc<SqliteSongStore>,
    pub conversations: Arc<SqliteConversationStore>,
    pub summarizer: Arc<SummarizationService>,
    pub directory: Arc<ActorDirectory>,
    pub logger: Arc<ConversationLogger>,
    pub orchestrator: Arc<GenerationOrchestrator>,
}

impl Services {
    /// Open the configured database and talk to real providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let path = config.database_path();
        let pool = db::open_pool(&path)
            .await
            .with_context(|| format!("open database {}", path.display()))?;
        let backend = Arc::new(HttpCompletionBackend::from_config(&config.completion));
        Self::assemble(config, pool, backend).await
    }

    pub async fn assemble(
        config: &Config,
        pool: SqlitePool,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self> {
        let songs = Arc::new(SqliteSongStore::new(pool.clone()).await?);
        let conversations = Arc::new(SqliteConversationStore::new(pool).await?);

        let client = StreamingCompletionClient::new(backend, ProviderEndpoints::from_config(&config.completion));
        let prompts: Arc<dyn PromptSource> = Arc::new(YamlPromptLibrary::new(config.prompts_dir()));
        let song_store: Arc<dyn SongStore> = songs.clone();
        let conversation_store: Arc<dyn ConversationStore> = conversations.clone();

        let summarizer = Arc::new(SummarizationService::new(
            Arc::clone(&conversation_store),
            Arc::clone(&song_store),
            client.clone(),
            Arc::clone(&prompts),
            config.summarization.clone(),
        ));
        let logger = Arc::new(ConversationLogger::new(config.log_dir()));
        let directory = Arc::new(ActorDirectory::from_config(config));

        let orchestrator = Arc::new(GenerationOrchestrator::new(GenerationServices {
            songs: song_store,
            conversations: conversation_store,
            summarizer: Arc::clone(&summarizer),
            client,
            prompts,
            logger: Arc::clone(&logger),
            stream_buffer: config.completion.stream_buffer,
        }));

        tracing::debug!(users = directory.len(), "services assembled");
        Ok(Self {
            songs,
            conversations,
            summarizer,
            directory,
            logger,
            orchestrator,
        })
    }

    /// Start recomputing song summarization flags after assistant saves.
    /// `None` if a worker is already attached.
    pub fn start_flag_refresher(&self) -> Option<JoinHandle<()>> {
        let (tx, handle) = spawn_flag_refresher(Arc::clone(&self.summarizer), Arc::clone(&self.directory));
        if self.conversations.attach_flag_refresh(tx) {
            Some(handle)
        } else {
            handle.abort();
            None
        }
    }
}
