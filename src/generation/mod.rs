//! Streamed generation of song names, styles, hooks, words and lyrics.

pub mod hooks;
pub mod lyrics;
pub mod lyrics_section;
pub mod names;
pub mod orchestrator;
pub mod params;
pub mod styles;
pub mod words;

pub use hooks::SongHooksGenerator;
pub use lyrics::SongLyricsGenerator;
pub use lyrics_section::SongLyricsSectionGenerator;
pub use names::SongNamesGenerator;
pub use orchestrator::{GenerationOrchestrator, GenerationServices, GenerationStream};
pub use styles::SongStylesGenerator;
pub use words::SongWordsGenerator;

use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::songs::{Song, SongStore};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tera::Context;

pub const UNEXPECTED_ERROR: &str = "an unexpected error occurred during generation";

/// One kind of generation request.
///
/// Implementations are built from validated request parameters; the
/// orchestrator drives the rest of the lifecycle through these hooks.
pub trait Generator: Send + Sync {
    fn prompt_name(&self) -> &str;

    fn purpose(&self) -> Purpose;

    fn song_id(&self) -> Option<i64>;

    /// Persist and replay the `(song, purpose)` conversation.
    fn uses_conversation_history(&self) -> bool {
        false
    }

    /// Template variables for the user prompt.
    fn load_context<'a>(
        &'a self,
        songs: &'a dyn SongStore,
        actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = Result<Context, GenerationError>> + Send + 'a>>;

    /// Side effects and enrichment for one parsed output record.
    fn preprocess_record<'a>(
        &'a self,
        record: Value,
        _songs: &'a dyn SongStore,
        _actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(async move { Ok(record) })
    }

    /// Runs once the stream has ended, however it ended.
    fn on_complete<'a>(
        &'a self,
        _songs: &'a dyn SongStore,
        _actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeneratorKind {
    Names,
    Styles,
    Hooks,
    Words,
    Lyrics,
    LyricsSection,
}

impl GeneratorKind {
    /// Validate `params` into a ready generator.
    pub fn build(self, params: &HashMap<String, String>) -> Result<Arc<dyn Generator>, GenerationError> {
        Ok(match self {
            Self::Names => Arc::new(SongNamesGenerator::from_params(params)?),
            Self::Styles => Arc::new(SongStylesGenerator::from_params(params)?),
            Self::Hooks => Arc::new(SongHooksGenerator::from_params(params)?),
            Self::Words => Arc::new(SongWordsGenerator::from_params(params)?),
            Self::Lyrics => Arc::new(SongLyricsGenerator::from_params(params)?),
            Self::LyricsSection => Arc::new(SongLyricsSectionGenerator::from_params(params)?),
        })
    }
}

/// The actor's song `song_id`, or `NotFound` when it is missing or foreign.
pub(crate) async fn owned_song(
    songs: &dyn SongStore,
    song_id: i64,
    actor: &Actor,
) -> Result<Song, GenerationError> {
    match songs.get_song(song_id, &actor.id).await {
        Ok(Some(song)) => Ok(song),
        Ok(None) => {
            tracing::warn!(song_id, user = %actor.id, "generation for unknown song");
            Err(GenerationError::NotFound(format!("song {song_id} not found")))
        }
        Err(error) => {
            tracing::error!(song_id, error = %error, "failed to load song for generation");
            Err(GenerationError::Internal(UNEXPECTED_ERROR.into()))
        }
    }
}

/// Song-level theme lists, falling back to the actor's defaults.
pub(crate) fn theme_lists(song: &Song, actor: &Actor) -> (String, String) {
    let pick = |own: &str, fallback: &str| {
        if own.trim().is_empty() {
            fallback.to_string()
        } else {
            own.to_string()
        }
    };
    (
        pick(&song.include_themes, &actor.include_themes),
        pick(&song.exclude_themes, &actor.exclude_themes),
    )
}

/// Non-empty string field of a JSON object record.
pub(crate) fn string_field<'v>(record: &'v Value, key: &str) -> Option<&'v str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}
