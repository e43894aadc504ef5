use super::hooks::VocalisationLevel;
use super::params::Params;
use super::{Generator, owned_song, theme_lists};
use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::songs::{SongStage, SongStore, SongStructure};
use anyhow::Context as _;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tera::Context;

const DEFAULT_PROMPT: &str = "song_lyrics";

/// Full lyrics for an existing song, refined over a persistent conversation.
#[derive(Debug, Clone)]
pub struct SongLyricsGenerator {
    prompt: String,
    song_id: i64,
    filter: String,
}

impl SongLyricsGenerator {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, GenerationError> {
        let params = Params::new(raw);
        Ok(Self {
            prompt: params.prompt_name(Some(DEFAULT_PROMPT))?,
            song_id: params.song_id()?,
            filter: params.text("filter"),
        })
    }
}

impl Generator for SongLyricsGenerator {
    fn prompt_name(&self) -> &str {
        &self.prompt
    }

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
            let (include_themes, exclude_themes) = theme_lists(&song, actor);

            let mut context = Context::new();
            context.insert("song_name", &song.name);
            context.insert("include_themes", &include_themes);
            context.insert("exclude_themes", &exclude_themes);
            context.insert("theme", &song.theme);
            context.insert("narrative", &song.narrative);
            context.insert("mood", &song.mood);
            context.insert("hook", &song.hook);
            context.insert("filter", &self.filter);
            insert_structure(&mut context, &song.structure);
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

    fn on_complete<'a>(
        &'a self,
        songs: &'a dyn SongStore,
        actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            match songs
                .update_stage(self.song_id, &actor.id, SongStage::Generated)
                .await
            {
                Ok(true) => tracing::debug!(song_id = self.song_id, "song marked generated"),
                Ok(false) => tracing::warn!(song_id = self.song_id, "song vanished before stage update"),
                Err(error) => {
                    tracing::error!(song_id = self.song_id, error = %error, "failed to update song stage");
                }
            }
        })
    }
}

fn insert_structure(context: &mut Context, shape: &SongStructure) {
    let (level, terms) = match VocalisationLevel::from_level(shape.vocalisation_level) {
        Some(level) => (<&str>::from(level), shape.vocalisation_terms.as_str()),
        None => ("", ""),
    };
    context.insert("custom_request", &shape.custom_request);
    context.insert("vocalisation_level", level);
    context.insert("vocalisation_terms", terms);
    context.insert("vocalisation_lines", &shape.vocalisation_lines);
    context.insert("syllables", &shape.syllables);
    context.insert("verse_count", &shape.verse_count);
    context.insert("verse_lines", &shape.verse_lines);
    context.insert("pre_chorus_lines", &shape.pre_chorus_lines);
    context.insert("chorus_lines", &shape.chorus_lines);
    context.insert("bridge_lines", &shape.bridge_lines);
    context.insert("intro_lines", &shape.intro_lines);
    context.insert("outro_lines", &shape.outro_lines);
}

/// `verse2` → `verse`. Keys made only of digits are left alone.
fn section_type(key: &str) -> &str {
    let base = key.trim_end_matches(|c: char| c.is_ascii_digit());
    if base.is_empty() { key } else { base }
}

/// A section body: a string, or an array of lines joined with newlines.
fn section_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(lines) => lines
            .iter()
            .map(|line| line.as_str().map_or_else(|| line.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Store every key of `record` as a lyric section under its original label,
/// then emit the record with numbered keys collapsed to their section type.
/// A later `verse2` replaces `verse1` in the emitted record only.
pub(crate) async fn save_sections(
    songs: &dyn SongStore,
    song_id: i64,
    record: Value,
) -> anyhow::Result<Value> {
    let Value::Object(fields) = record else {
        return Ok(record);
    };
    let mut collapsed = Map::new();
    for (label, value) in fields {
        let text = section_text(&value);
        let section = songs
            .add_lyric_section(song_id, &label, &text)
            .await
            .with_context(|| format!("save lyric section {label}"))?;
        tracing::debug!(song_id, section_id = section.id, label = %label, "saved lyric section");
        collapsed.insert(section_type(&label).to_string(), value);
    }
    Ok(Value::Object(collapsed))
}
