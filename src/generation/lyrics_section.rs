use super::lyrics::save_sections;
use super::params::Params;
use super::{Generator, owned_song};
use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::songs::SongStore;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tera::Context;

const DEFAULT_PROMPT: &str = "song_lyrics_section";

/// Rewrites of one section inside the song's lyrics conversation.
#[derive(Debug, Clone)]
pub struct SongLyricsSectionGenerator {
    prompt: String,
    song_id: i64,
    section_type: String,
    count: u32,
    custom_request: String,
}

impl SongLyricsSectionGenerator {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, GenerationError> {
        let params = Params::new(raw);
        let section_type = params.text("section_type");
        if section_type.is_empty() {
            return Err(GenerationError::Validation("section_type is required".into()));
        }
        let count = params.number("count", 1_u32)?;
        if !(1..=10).contains(&count) {
            return Err(GenerationError::Validation("count must be between 1 and 10".into()));
        }
        Ok(Self {
            prompt: params.prompt_name(Some(DEFAULT_PROMPT))?,
            song_id: params.song_id()?,
            section_type,
            count,
            custom_request: params.text("custom_request"),
        })
    }
}

impl Generator for SongLyricsSectionGenerator {
    fn prompt_name(&self) -> &str {
        &self.prompt
    }

    /// Shares the thread with full lyrics so rewrites see the current draft.
    fn purpose(&self) -> Purpose {
        Purpose::Lyrics
    }

    fn song_id(&self) -> Option<i64> {
        Some(self.song_id)
    }

    fn uses_conversation_history(&self) -> bool {
        true
    }

    fn load_context<'a>(
        &'a self,
        songs: &'a dyn SongStore,
        actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = Result<Context, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let song = owned_song(songs, self.song_id, actor).await?;

            let mut context = Context::new();
            context.insert("song_name", &song.name);
            context.insert("section_type", &self.section_type);
            context.insert("count", &self.count);
            context.insert("custom_request", &self.custom_request);
            Ok(context)
        })
    }

    fn preprocess_record<'a>(
        &'a self,
        record: Value,
        songs: &'a dyn SongStore,
        _actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(save_sections(songs, self.song_id, record))
    }
}
