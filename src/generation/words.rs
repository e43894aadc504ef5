use super::params::{MAX_LIST_CHARS, Params};
use super::{Generator, owned_song, theme_lists};
use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::songs::SongStore;
use crate::utils::text::normalize_to_ascii;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tera::Context;

const DEFAULT_PROMPT: &str = "song_words";

/// Replacement or rhyming words for one spot in a song's lyrics.
///
/// The spot (`word_line`, `word_index`) is echoed back on every record so the
/// caller can place the suggestion. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct SongWordsGenerator {
    prompt: String,
    song_id: i64,
    rhyme_with: String,
    word_line: i64,
    word_index: i64,
    song_section: String,
    section_type: String,
    exclude_list: String,
    count: u32,
    custom_request: String,
}

impl SongWordsGenerator {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, GenerationError> {
        let params = Params::new(raw);
        let count = params.number("count", 10_u32)?;
        if !(1..=50).contains(&count) {
            return Err(GenerationError::Validation("count must be between 1 and 50".into()));
        }
        let exclude_list = params.text("exclude_list").replace(',', ", ");
        if exclude_list.chars().count() > MAX_LIST_CHARS {
            return Err(GenerationError::Validation(format!(
                "exclude_list parameter is too long (max {MAX_LIST_CHARS} characters)"
            )));
        }

        Ok(Self {
            prompt: params.prompt_name(Some(DEFAULT_PROMPT))?,
            song_id: params.song_id()?,
            rhyme_with: params.text("rhyme_with"),
            word_line: params.number("word_line", -1)?,
            word_index: params.number("word_index", -1)?,
            song_section: params.text("song_section"),
            section_type: params.text("section_type"),
            exclude_list,
            count,
            custom_request: params.text("custom_request"),
        })
    }
}

impl Generator for SongWordsGenerator {
    fn prompt_name(&self) -> &str {
        &self.prompt
    }

    fn purpose(&self) -> Purpose {
        Purpose::Words
    }

    fn song_id(&self) -> Option<i64> {
        Some(self.song_id)
    }

    fn load_context<'a>(
        &'a self,
        songs: &'a dyn SongStore,
        actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = Result<Context, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let song = owned_song(songs, self.song_id, actor).await?;
            let (include_themes, exclude_themes) = theme_lists(&song, actor);
            tracing::debug!(
                song_id = self.song_id,
                rhyme_with = %self.rhyme_with,
                line = self.word_line,
                index = self.word_index,
                count = self.count,
                "song word parameters"
            );

            let mut context = Context::new();
            context.insert("song_name", &song.name);
            context.insert("include_themes", &include_themes);
            context.insert("exclude_themes", &exclude_themes);
            context.insert("theme", &song.theme);
            context.insert("narrative", &song.narrative);
            context.insert("mood", &song.mood);
            context.insert("rhyme_with", &self.rhyme_with);
            context.insert("exclude_list", &self.exclude_list);
            context.insert("song_section", &self.song_section);
            context.insert("section_type", &self.section_type);
            context.insert("count", &self.count);
            context.insert("custom_request", &self.custom_request);
            Ok(context)
        })
    }

    fn preprocess_record<'a>(
        &'a self,
        record: Value,
        _songs: &'a dyn SongStore,
        _actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            // Models key the word however they like; the last string value wins.
            let word = match &record {
                Value::Object(fields) => fields.values().rev().find_map(Value::as_str),
                Value::String(word) => Some(word.as_str()),
                _ => None,
            };
            let Some(word) = word.map(|w| normalize_to_ascii(w.trim()).into_owned()) else {
                anyhow::bail!("record has no word");
            };
            Ok(json!({
                "word": word,
                "line": self.word_line,
                "index": self.word_index,
            }))
        })
    }
}
