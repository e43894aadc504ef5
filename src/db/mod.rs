//! SQLite pool setup and the shared schema for songs, sections, and messages.

mod clock;

pub use clock::{MonotonicClock, micros_to_datetime};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS songsmith_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCHEMA_VERSION: u32 = 1;

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS songs (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         owner_id TEXT NOT NULL,
         name TEXT NOT NULL,
         stage TEXT NOT NULL DEFAULT 'named',
         theme TEXT NOT NULL DEFAULT '',
         narrative TEXT NOT NULL DEFAULT '',
         mood TEXT NOT NULL DEFAULT '',
         hook TEXT NOT NULL DEFAULT '',
         include_themes TEXT NOT NULL DEFAULT '',
         exclude_themes TEXT NOT NULL DEFAULT '',
         custom_request TEXT NOT NULL DEFAULT '',
         vocalisation_level INTEGER NOT NULL DEFAULT 0,
         vocalisation_terms TEXT NOT NULL DEFAULT '',
         vocalisation_lines INTEGER NOT NULL DEFAULT 0,
         syllables INTEGER NOT NULL DEFAULT 8,
         verse_count INTEGER NOT NULL DEFAULT 1,
         verse_lines INTEGER NOT NULL DEFAULT 4,
         pre_chorus_lines INTEGER NOT NULL DEFAULT 4,
         chorus_lines INTEGER NOT NULL DEFAULT 4,
         bridge_lines INTEGER NOT NULL DEFAULT 4,
         intro_lines INTEGER NOT NULL DEFAULT 4,
         outro_lines INTEGER NOT NULL DEFAULT 4,
         needs_summarization INTEGER NOT NULL DEFAULT 0,
         created_at TEXT NOT NULL
     )",
    "CREATE INDEX IF NOT EXISTS idx_songs_owner ON songs(owner_id)",
    "CREATE TABLE IF NOT EXISTS song_sections (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
         kind TEXT NOT NULL,
         label TEXT NOT NULL DEFAULT '',
         text TEXT NOT NULL,
         created_at TEXT NOT NULL
     )",
    "CREATE INDEX IF NOT EXISTS idx_song_sections_song ON song_sections(song_id, kind)",
    "CREATE TABLE IF NOT EXISTS messages (
         id TEXT PRIMARY KEY,
         song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
         purpose TEXT NOT NULL,
         role TEXT NOT NULL,
         content TEXT NOT NULL,
         active INTEGER NOT NULL DEFAULT 1,
         created_at_us INTEGER NOT NULL
     )",
    "CREATE INDEX IF NOT EXISTS idx_messages_thread
         ON messages(song_id, purpose, active, created_at_us)",
];

/// Open (creating if needed) the database file at `path`.
pub async fn open_pool(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .with_context(|| format!("open database {}", path.display()))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, used by tests and dry runs.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("open in-memory database")?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Create tables if missing and verify the stored schema version.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .context("enable foreign keys")?;

    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create songsmith_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM songsmith_schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == SCHEMA_VERSION,
            "incompatible schema version: stored={parsed}, expected={SCHEMA_VERSION}"
        );
    }

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("apply schema")?;
    }

    sqlx::query("INSERT OR IGNORE INTO songsmith_schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist schema version")?;

    Ok(())
}
