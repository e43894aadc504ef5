use super::{NewSong, Section, SectionKind, Song, SongStage, SongStructure, SongUpdate};
use crate::db;
use crate::error::StoreError;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// Async song persistence contract. Reads and user-facing mutations are
/// scoped by owner; flag updates are internal and unscoped.
pub trait SongStore: Send + Sync {
    fn create_song<'a>(
        &'a self,
        owner: &'a str,
        song: NewSong,
    ) -> Pin<Box<dyn Future<Output = Result<Song>> + Send + 'a>>;

    fn get_song<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Song>>> + Send + 'a>>;

    fn list_songs<'a>(
        &'a self,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Song>>> + Send + 'a>>;

    fn update_stage<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
        stage: SongStage,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn update_fields<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
        update: SongUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn needs_summarization(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<bool>>> + Send + '_>>;

    fn set_needs_summarization(
        &self,
        id: i64,
        value: bool,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    fn delete_song<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn add_section<'a>(
        &'a self,
        song_id: i64,
        kind: SectionKind,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Section>> + Send + 'a>>;

    /// Store one labelled block of lyrics as a [`SectionKind::Lyric`] row.
    fn add_lyric_section<'a>(
        &'a self,
        song_id: i64,
        label: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Section>> + Send + 'a>>;

    fn list_sections(
        &self,
        song_id: i64,
        kind: Option<SectionKind>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Section>>> + Send + '_>>;
}

/// SQLite-backed song store sharing the conversation database.
pub struct SqliteSongStore {
    pool: SqlitePool,
}

impl SqliteSongStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        db::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_section(
        &self,
        song_id: i64,
        kind: SectionKind,
        label: &str,
        text: &str,
    ) -> Result<Section> {
        let result = sqlx::query(
            "INSERT INTO song_sections (song_id, kind, label, text, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(song_id)
        .bind(kind.to_string())
        .bind(label)
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("insert song section")?;

        Ok(Section {
            id: result.last_insert_rowid(),
            song_id,
            kind,
            label: label.to_string(),
            text: text.to_string(),
        })
    }
}

const SONG_COLUMNS: &str = "id, owner_id, name, stage, theme, narrative, mood, hook, \
     include_themes, exclude_themes, custom_request, vocalisation_level, vocalisation_terms, \
     vocalisation_lines, syllables, verse_count, verse_lines, pre_chorus_lines, chorus_lines, \
     bridge_lines, intro_lines, outro_lines, needs_summarization, created_at";

const SECTION_COLUMNS: &str = "id, song_id, kind, label, text";

fn map_song_row(row: &SqliteRow) -> Result<Song> {
    let stage_raw: String = row.try_get("stage")?;
    let flag: i64 = row.try_get("needs_summarization")?;

    Ok(Song {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        stage: SongStage::from_str(&stage_raw)
            .map_err(|_| StoreError::Corrupt(format!("unknown song stage: {stage_raw}")))?,
        theme: row.try_get("theme")?,
        narrative: row.try_get("narrative")?,
        mood: row.try_get("mood")?,
        hook: row.try_get("hook")?,
        include_themes: row.try_get("include_themes")?,
        exclude_themes: row.try_get("exclude_themes")?,
        structure: SongStructure {
            custom_request: row.try_get("custom_request")?,
            vocalisation_level: row.try_get("vocalisation_level")?,
            vocalisation_terms: row.try_get("vocalisation_terms")?,
            vocalisation_lines: row.try_get("vocalisation_lines")?,
            syllables: row.try_get("syllables")?,
            verse_count: row.try_get("verse_count")?,
            verse_lines: row.try_get("verse_lines")?,
            pre_chorus_lines: row.try_get("pre_chorus_lines")?,
            chorus_lines: row.try_get("chorus_lines")?,
            bridge_lines: row.try_get("bridge_lines")?,
            intro_lines: row.try_get("intro_lines")?,
            outro_lines: row.try_get("outro_lines")?,
        },
        needs_summarization: flag != 0,
        created_at: row.try_get("created_at")?,
    })
}

fn map_section_row(row: &SqliteRow) -> Result<Section> {
    let kind_raw: String = row.try_get("kind")?;
    Ok(Section {
        id: row.try_get("id")?,
        song_id: row.try_get("song_id")?,
        kind: SectionKind::from_str(&kind_raw)
            .map_err(|_| StoreError::Corrupt(format!("unknown section kind: {kind_raw}")))?,
        label: row.try_get("label")?,
        text: row.try_get("text")?,
    })
}

impl SongStore for SqliteSongStore {
    fn create_song<'a>(
        &'a self,
        owner: &'a str,
        song: NewSong,
    ) -> Pin<Box<dyn Future<Output = Result<Song>> + Send + 'a>> {
        Box::pin(async move {
            let timestamp = Utc::now().to_rfc3339();
            let shape = &song.structure;
            let result = sqlx::query(
                "INSERT INTO songs (owner_id, name, stage, include_themes, exclude_themes,
                     custom_request, vocalisation_level, vocalisation_terms, vocalisation_lines,
                     syllables, verse_count, verse_lines, pre_chorus_lines, chorus_lines,
                     bridge_lines, intro_lines, outro_lines, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
            )
            .bind(owner)
            .bind(&song.name)
            .bind(SongStage::Named.to_string())
            .bind(&song.include_themes)
            .bind(&song.exclude_themes)
            .bind(&shape.custom_request)
            .bind(shape.vocalisation_level)
            .bind(&shape.vocalisation_terms)
            .bind(shape.vocalisation_lines)
            .bind(shape.syllables)
            .bind(shape.verse_count)
            .bind(shape.verse_lines)
            .bind(shape.pre_chorus_lines)
            .bind(shape.chorus_lines)
            .bind(shape.bridge_lines)
            .bind(shape.intro_lines)
            .bind(shape.outro_lines)
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .context("insert song")?;

            Ok(Song {
                id: result.last_insert_rowid(),
                owner_id: owner.to_string(),
                name: song.name,
                stage: SongStage::Named,
                theme: String::new(),
                narrative: String::new(),
                mood: String::new(),
                hook: String::new(),
                include_themes: song.include_themes,
                exclude_themes: song.exclude_themes,
                structure: song.structure,
                needs_summarization: false,
                created_at: timestamp,
            })
        })
    }

    fn get_song<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Song>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {SONG_COLUMNS} FROM songs WHERE id = $1 AND owner_id = $2"
            ))
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .context("query song by id")?;

            row.map(|r| map_song_row(&r)).transpose()
        })
    }

    fn list_songs<'a>(
        &'a self,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Song>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {SONG_COLUMNS} FROM songs WHERE owner_id = $1 ORDER BY id"
            ))
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .context("list songs")?;

            rows.iter().map(map_song_row).collect()
        })
    }

    fn update_stage<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
        stage: SongStage,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE songs SET stage = $1 WHERE id = $2 AND owner_id = $3")
                .bind(stage.to_string())
                .bind(id)
                .bind(owner)
                .execute(&self.pool)
                .await
                .context("update song stage")?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn update_fields<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
        update: SongUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.context("begin song update")?;
            let result = sqlx::query(
                "UPDATE songs
                 SET theme = COALESCE($1, theme),
                     narrative = COALESCE($2, narrative),
                     mood = COALESCE($3, mood),
                     hook = COALESCE($4, hook)
                 WHERE id = $5 AND owner_id = $6",
            )
            .bind(update.theme)
            .bind(update.narrative)
            .bind(update.mood)
            .bind(update.hook)
            .bind(id)
            .bind(owner)
            .execute(&mut *tx)
            .await
            .context("update song fields")?;

            if let Some(shape) = update.structure {
                sqlx::query(
                    "UPDATE songs
                     SET custom_request = $1, vocalisation_level = $2, vocalisation_terms = $3,
                         vocalisation_lines = $4, syllables = $5, verse_count = $6,
                         verse_lines = $7, pre_chorus_lines = $8, chorus_lines = $9,
                         bridge_lines = $10, intro_lines = $11, outro_lines = $12
                     WHERE id = $13 AND owner_id = $14",
                )
                .bind(shape.custom_request)
                .bind(shape.vocalisation_level)
                .bind(shape.vocalisation_terms)
                .bind(shape.vocalisation_lines)
                .bind(shape.syllables)
                .bind(shape.verse_count)
                .bind(shape.verse_lines)
                .bind(shape.pre_chorus_lines)
                .bind(shape.chorus_lines)
                .bind(shape.bridge_lines)
                .bind(shape.intro_lines)
                .bind(shape.outro_lines)
                .bind(id)
                .bind(owner)
                .execute(&mut *tx)
                .await
                .context("update song structure")?;
            }

            tx.commit().await.context("commit song update")?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn needs_summarization(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<bool>>> + Send + '_>> {
        Box::pin(async move {
            let flag: Option<(i64,)> =
                sqlx::query_as("SELECT needs_summarization FROM songs WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("load summarization flag")?;
            Ok(flag.map(|(value,)| value != 0))
        })
    }

    fn set_needs_summarization(
        &self,
        id: i64,
        value: bool,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE songs SET needs_summarization = $1 WHERE id = $2")
                .bind(i64::from(value))
                .bind(id)
                .execute(&self.pool)
                .await
                .context("update summarization flag")?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_song<'a>(
        &'a self,
        id: i64,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM songs WHERE id = $1 AND owner_id = $2")
                .bind(id)
                .bind(owner)
                .execute(&self.pool)
                .await
                .context("delete song")?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn add_section<'a>(
        &'a self,
        song_id: i64,
        kind: SectionKind,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Section>> + Send + 'a>> {
        Box::pin(self.insert_section(song_id, kind, "", text))
    }

    fn add_lyric_section<'a>(
        &'a self,
        song_id: i64,
        label: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Section>> + Send + 'a>> {
        Box::pin(self.insert_section(song_id, SectionKind::Lyric, label, text))
    }

    fn list_sections(
        &self,
        song_id: i64,
        kind: Option<SectionKind>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Section>>> + Send + '_>> {
        Box::pin(async move {
            let rows = if let Some(kind) = kind {
                sqlx::query(&format!(
                    "SELECT {SECTION_COLUMNS} FROM song_sections
                     WHERE song_id = $1 AND kind = $2
                     ORDER BY id"
                ))
                .bind(song_id)
                .bind(kind.to_string())
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query(&format!(
                    "SELECT {SECTION_COLUMNS} FROM song_sections
                     WHERE song_id = $1
                     ORDER BY id"
                ))
                .bind(song_id)
                .fetch_all(&self.pool)
                .await?
            };

            rows.iter().map(map_section_row).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteSongStore {
        SqliteSongStore::new(db::open_in_memory().await.unwrap())
            .await
            .unwrap()
    }

    fn new_song(name: &str) -> NewSong {
        NewSong {
            name: name.into(),
            ..NewSong::default()
        }
    }

    #[tokio::test]
    async fn create_and_get_are_owner_scoped() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Night Drive")).await.unwrap();
        assert_eq!(song.stage, SongStage::Named);

        let fetched = store.get_song(song.id, "alice").await.unwrap().unwrap();
        assert_eq!(fetched, song);
        assert!(store.get_song(song.id, "bob").await.unwrap().is_none());
        assert!(store.list_songs("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stage_and_field_updates_respect_owner() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Tidal")).await.unwrap();

        assert!(!store.update_stage(song.id, "bob", SongStage::Styled).await.unwrap());
        assert!(store.update_stage(song.id, "alice", SongStage::Styled).await.unwrap());

        let update = SongUpdate {
            mood: Some("wistful".into()),
            ..SongUpdate::default()
        };
        assert!(store.update_fields(song.id, "alice", update).await.unwrap());

        let fetched = store.get_song(song.id, "alice").await.unwrap().unwrap();
        assert_eq!(fetched.stage, SongStage::Styled);
        assert_eq!(fetched.mood, "wistful");
        assert_eq!(fetched.theme, "");
    }

    #[tokio::test]
    async fn summarization_flag_round_trips() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Echo")).await.unwrap();

        assert_eq!(store.needs_summarization(song.id).await.unwrap(), Some(false));
        assert!(store.set_needs_summarization(song.id, true).await.unwrap());
        assert_eq!(store.needs_summarization(song.id).await.unwrap(), Some(true));
        assert_eq!(store.needs_summarization(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sections_filter_by_kind_and_cascade_on_delete() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Harbor")).await.unwrap();
        store.add_section(song.id, SectionKind::Theme, "leaving home").await.unwrap();
        store.add_section(song.id, SectionKind::Hook, "la la la").await.unwrap();

        let hooks = store.list_sections(song.id, Some(SectionKind::Hook)).await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].text, "la la la");
        assert_eq!(store.list_sections(song.id, None).await.unwrap().len(), 2);

        assert!(store.delete_song(song.id, "alice").await.unwrap());
        assert!(store.list_sections(song.id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn structure_defaults_then_replaces_whole() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Ferris")).await.unwrap();
        assert_eq!(song.structure, SongStructure::default());
        assert_eq!(store.get_song(song.id, "alice").await.unwrap().unwrap().structure.syllables, 8);

        let shape = SongStructure {
            custom_request: "no rhyming couplets".into(),
            vocalisation_level: 2,
            vocalisation_terms: "ooh, yeah".into(),
            verse_count: 3,
            chorus_lines: 6,
            ..SongStructure::default()
        };
        let update = SongUpdate {
            hook: Some("round and round".into()),
            structure: Some(shape.clone()),
            ..SongUpdate::default()
        };
        assert!(store.update_fields(song.id, "alice", update.clone()).await.unwrap());
        assert!(!store.update_fields(song.id, "bob", update).await.unwrap());

        let fetched = store.get_song(song.id, "alice").await.unwrap().unwrap();
        assert_eq!(fetched.structure, shape);
        assert_eq!(fetched.hook, "round and round");

        let untouched = SongUpdate {
            mood: Some("giddy".into()),
            ..SongUpdate::default()
        };
        store.update_fields(song.id, "alice", untouched).await.unwrap();
        let fetched = store.get_song(song.id, "alice").await.unwrap().unwrap();
        assert_eq!(fetched.structure.verse_count, 3);
    }

    #[tokio::test]
    async fn lyric_sections_keep_their_labels() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Harbor")).await.unwrap();
        store.add_section(song.id, SectionKind::Mood, "restless").await.unwrap();
        let saved = store.add_lyric_section(song.id, "verse1", "salt on the rope").await.unwrap();
        assert_eq!(saved.kind, SectionKind::Lyric);

        let lyrics = store.list_sections(song.id, Some(SectionKind::Lyric)).await.unwrap();
        assert_eq!(lyrics, vec![saved]);
        assert_eq!(lyrics[0].label, "verse1");
        let moods = store.list_sections(song.id, Some(SectionKind::Mood)).await.unwrap();
        assert_eq!(moods[0].label, "");
    }

    #[tokio::test]
    async fn unknown_stage_is_reported_as_corrupt() {
        let store = store().await;
        let song = store.create_song("alice", new_song("Glitch")).await.unwrap();
        sqlx::query("UPDATE songs SET stage = 'mastered' WHERE id = $1")
            .bind(song.id)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get_song(song.id, "alice").await.unwrap_err();
        assert_eq!(err.to_string(), "corrupt row: unknown song stage: mastered");
    }
}
