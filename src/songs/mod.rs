pub mod store;

pub use store::{SongStore, SqliteSongStore};

use serde::{Deserialize, Serialize};

/// Where a song sits in the name → style → hook → lyrics flow.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SongStage {
    Named,
    Styled,
    Hooked,
    Generated,
}

/// Kind of generated option attached to a song.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SectionKind {
    Theme,
    Narrative,
    Mood,
    Hook,
    /// A labelled block of lyrics (`verse`, `chorus`, ...).
    Lyric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub stage: SongStage,
    pub theme: String,
    pub narrative: String,
    pub mood: String,
    pub hook: String,
    pub include_themes: String,
    pub exclude_themes: String,
    #[serde(flatten)]
    pub structure: SongStructure,
    pub needs_summarization: bool,
    pub created_at: String,
}

/// Shape the lyrics should take. Line counts are per section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongStructure {
    pub custom_request: String,
    /// `0` disables vocalisations; see [`crate::generation::hooks::VocalisationLevel`].
    pub vocalisation_level: i64,
    pub vocalisation_terms: String,
    pub vocalisation_lines: i64,
    pub syllables: i64,
    pub verse_count: i64,
    pub verse_lines: i64,
    pub pre_chorus_lines: i64,
    pub chorus_lines: i64,
    pub bridge_lines: i64,
    pub intro_lines: i64,
    pub outro_lines: i64,
}

impl Default for SongStructure {
    fn default() -> Self {
        Self {
            custom_request: String::new(),
            vocalisation_level: 0,
            vocalisation_terms: String::new(),
            vocalisation_lines: 0,
            syllables: 8,
            verse_count: 1,
            verse_lines: 4,
            pre_chorus_lines: 4,
            chorus_lines: 4,
            bridge_lines: 4,
            intro_lines: 4,
            outro_lines: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub song_id: i64,
    pub kind: SectionKind,
    /// Free-form label for [`SectionKind::Lyric`] rows, empty otherwise.
    pub label: String,
    pub text: String,
}

/// Partial update of the chosen style, hook and structure. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongUpdate {
    pub theme: Option<String>,
    pub narrative: Option<String>,
    pub mood: Option<String>,
    pub hook: Option<String>,
    /// Replaces the whole structure when set.
    pub structure: Option<SongStructure>,
}

/// Input for [`SongStore::create_song`].
#[derive(Debug, Clone, Default)]
pub struct NewSong {
    pub name: String,
    pub include_themes: String,
    pub exclude_themes: String,
    pub structure: SongStructure,
}
