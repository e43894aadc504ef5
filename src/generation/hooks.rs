use super::params::Params;
use super::{Generator, owned_song, string_field, theme_lists};
use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::songs::{SectionKind, SongStore};
use crate::utils::text::normalize_to_ascii;
use anyhow::Context as _;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tera::Context;

const DEFAULT_PROMPT: &str = "song_hooks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum VocalisationLevel {
    Low,
    Medium,
    High,
}

impl VocalisationLevel {
    /// `0` or below disables vocalisations; anything above 3 is `High`.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            i64::MIN..=0 => None,
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            _ => Some(Self::High),
        }
    }
}

/// Candidate hooks for an existing song.
#[derive(Debug, Clone)]
pub struct SongHooksGenerator {
    prompt: String,
    song_id: i64,
    rhyme: String,
    vocalisation: Option<VocalisationLevel>,
    vocalisation_terms: String,
    lines: u32,
    count: u32,
    syllables: u32,
    custom_prompt: String,
}

impl SongHooksGenerator {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, GenerationError> {
        let params = Params::new(raw);
        Ok(Self {
            prompt: params.prompt_name(Some(DEFAULT_PROMPT))?,
            song_id: params.song_id()?,
            rhyme: params.text("rhyme"),
            vocalisation: VocalisationLevel::from_level(params.number("vocalisation_level", 0_i64)?),
            vocalisation_terms: params.text("vocalisation_terms"),
            lines: params.number("lines", 1)?,
            count: params.number("count", 5)?,
            syllables: params.number("syllables", 8)?,
            custom_prompt: params.text("custom_prompt"),
        })
    }
}

impl Generator for SongHooksGenerator {
    fn prompt_name(&self) -> &str {
        &self.prompt
    }

    fn purpose(&self) -> Purpose {
        Purpose::Hook
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

            let mut context = Context::new();
            context.insert("song_name", &song.name);
            context.insert("theme", &song.theme);
            context.insert("narrative", &song.narrative);
            context.insert("mood", &song.mood);
            context.insert("custom_prompt", &self.custom_prompt);
            context.insert("rhyme", &self.rhyme);
            context.insert("include_themes", &include_themes);
            context.insert("exclude_themes", &exclude_themes);
            context.insert("lines", &self.lines);
            context.insert("count", &self.count);
            context.insert("syllables", &self.syllables);

            // Templates test these for emptiness; terms only count with a level.
            let (level, terms) = match self.vocalisation {
                Some(level) => (<&str>::from(level), self.vocalisation_terms.as_str()),
                None => ("", ""),
            };
            context.insert("vocalisation_level", level);
            context.insert("vocalisation_terms", terms);
            Ok(context)
        })
    }

    fn preprocess_record<'a>(
        &'a self,
        mut record: Value,
        songs: &'a dyn SongStore,
        _actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            let Some(hook) = string_field(&record, "hook").map(|h| normalize_to_ascii(h).into_owned())
            else {
                return Ok(record);
            };
            let section = songs
                .add_section(self.song_id, SectionKind::Hook, &hook)
                .await
                .context("save hook option")?;
            tracing::debug!(song_id = self.song_id, section_id = section.id, "saved hook option");
            record["hook"] = json!(hook);
            record["id"] = json!(section.id);
            Ok(record)
        })
    }
}
