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

const DEFAULT_PROMPT: &str = "song_styles";

/// Which style facets to ask for; `All` when no filter is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleFilter {
    All,
    Theme,
    Narrative,
    Mood,
}

impl StyleFilter {
    fn parse(raw: &str) -> Result<Self, GenerationError> {
        match raw.to_ascii_uppercase().as_str() {
            "" => Ok(Self::All),
            "THEME" => Ok(Self::Theme),
            "NARRATIVE" => Ok(Self::Narrative),
            "MOOD" => Ok(Self::Mood),
            _ => Err(GenerationError::Validation(
                "style_filter must be one of THEME, NARRATIVE or MOOD".into(),
            )),
        }
    }

    fn includes(self, facet: Self) -> bool {
        self == Self::All || self == facet
    }
}

/// Theme, narrative and mood options for an existing song.
#[derive(Debug, Clone)]
pub struct SongStylesGenerator {
    prompt: String,
    song_id: i64,
    custom_request: String,
    filter: StyleFilter,
}

impl SongStylesGenerator {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, GenerationError> {
        let params = Params::new(raw);
        Ok(Self {
            prompt: params.prompt_name(Some(DEFAULT_PROMPT))?,
            song_id: params.song_id()?,
            custom_request: params.text("custom_request"),
            filter: StyleFilter::parse(&params.text("style_filter"))?,
        })
    }
}

impl Generator for SongStylesGenerator {
    fn prompt_name(&self) -> &str {
        &self.prompt
    }

    fn purpose(&self) -> Purpose {
        Purpose::Style
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
            context.insert("custom_request", &self.custom_request);
            context.insert("include_themes", &include_themes);
            context.insert("exclude_themes", &exclude_themes);
            context.insert("theme", &self.filter.includes(StyleFilter::Theme));
            context.insert("narrative", &self.filter.includes(StyleFilter::Narrative));
            context.insert("mood", &self.filter.includes(StyleFilter::Mood));
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
            for (key, kind) in [
                ("theme", SectionKind::Theme),
                ("narrative", SectionKind::Narrative),
                ("mood", SectionKind::Mood),
            ] {
                let Some(text) = string_field(&record, key).map(|t| normalize_to_ascii(t).into_owned())
                else {
                    continue;
                };
                let section = songs
                    .add_section(self.song_id, kind, &text)
                    .await
                    .with_context(|| format!("save {key} option"))?;
                tracing::debug!(song_id = self.song_id, section_id = section.id, kind = %kind, "saved style option");
                record[key] = json!(text);
                record["id"] = json!(section.id);
            }
            Ok(record)
        })
    }
}
