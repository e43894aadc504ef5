use super::params::Params;
use super::{Generator, UNEXPECTED_ERROR, string_field};
use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::songs::{NewSong, SongStore};
use crate::utils::text::normalize_to_ascii;
use anyhow::Context as _;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tera::Context;

/// Brand-new song names. Each generated name is saved as a song.
#[derive(Debug, Clone)]
pub struct SongNamesGenerator {
    prompt: String,
    count: u32,
    min_words: u32,
    max_words: u32,
    include_themes: String,
    exclude_themes: String,
    exclude_words: String,
    raw_include: String,
    raw_exclude: String,
}

impl SongNamesGenerator {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, GenerationError> {
        let params = Params::new(raw);
        if params.text("prompt").is_empty() {
            return Err(GenerationError::Validation(
                "prompt name is required to generate song names".into(),
            ));
        }
        let prompt = params.prompt_name(None)?;

        let count = params.number("count", 1_u32)?;
        let min_words = params.number("min_words", 1_u32)?;
        let max_words = params.number("max_words", 5_u32)?;
        if !(1..=50).contains(&count) {
            return Err(GenerationError::Validation("count must be between 1 and 50".into()));
        }
        if !(1..=20).contains(&min_words) {
            return Err(GenerationError::Validation(
                "min_words must be between 1 and 20".into(),
            ));
        }
        if max_words < min_words || max_words > 20 {
            return Err(GenerationError::Validation(
                "max_words must be between min_words and 20".into(),
            ));
        }

        Ok(Self {
            prompt,
            count,
            min_words,
            max_words,
            include_themes: params.bracketed_list("include_themes")?,
            exclude_themes: params.bracketed_list("exclude_themes")?,
            exclude_words: params.bracketed_list("exclude_words")?,
            raw_include: params.text("include_themes"),
            raw_exclude: params.text("exclude_themes"),
        })
    }
}

impl Generator for SongNamesGenerator {
    fn prompt_name(&self) -> &str {
        &self.prompt
    }

    fn purpose(&self) -> Purpose {
        Purpose::Names
    }

    fn song_id(&self) -> Option<i64> {
        None
    }

    fn load_context<'a>(
        &'a self,
        songs: &'a dyn SongStore,
        actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = Result<Context, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let existing = songs.list_songs(&actor.id).await.map_err(|error| {
                tracing::error!(user = %actor.id, error = %error, "failed to list songs");
                GenerationError::Internal(UNEXPECTED_ERROR.into())
            })?;
            let exclude_song_names: Vec<String> = existing.into_iter().map(|song| song.name).collect();
            tracing::debug!(
                count = self.count,
                min_words = self.min_words,
                max_words = self.max_words,
                excluded = exclude_song_names.len(),
                "song name parameters"
            );

            let mut context = Context::new();
            context.insert("count", &self.count);
            context.insert("min_words", &self.min_words);
            context.insert("max_words", &self.max_words);
            context.insert("include_themes", &self.include_themes);
            context.insert("exclude_themes", &self.exclude_themes);
            context.insert("exclude_words", &self.exclude_words);
            context.insert("exclude_song_names", &exclude_song_names);
            Ok(context)
        })
    }

    fn preprocess_record<'a>(
        &'a self,
        mut record: Value,
        songs: &'a dyn SongStore,
        actor: &'a Actor,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            let Some(name) = string_field(&record, "name") else {
                return Ok(record);
            };
            let name = normalize_to_ascii(name).into_owned();
            let song = songs
                .create_song(
                    &actor.id,
                    NewSong {
                        name: name.clone(),
                        include_themes: self.raw_include.clone(),
                        exclude_themes: self.raw_exclude.clone(),
                        ..NewSong::default()
                    },
                )
                .await
                .context("save generated song name")?;
            record["name"] = json!(name);
            record["id"] = json!(song.id);
            Ok(record)
        })
    }
}
