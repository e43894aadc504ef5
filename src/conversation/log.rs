use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

pub const HEADER_WIDTH: usize = 120;
const LOG_EXTENSION: &str = "log";

/// Metadata about one conversation log file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogInfo {
    pub file_name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub sessions: usize,
}

/// Append-only transcript files, one per `(purpose, song)`.
pub struct ConversationLogger {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, purpose: &str, song_id: Option<i64>) -> PathBuf {
        self.dir.join(log_file_name(purpose, song_id))
    }

    /// Append one session. Failures are logged and swallowed.
    pub fn log_conversation(&self, purpose: &str, song_id: Option<i64>, transcript: &str) {
        if let Err(error) = self.append(purpose, song_id, transcript) {
            tracing::warn!(purpose, song_id, error = %format!("{error:#}"), "failed to write conversation log");
        }
    }

    fn append(&self, purpose: &str, song_id: Option<i64>, transcript: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create log directory {}", self.dir.display()))?;

        let path = self.log_path(purpose, song_id);
        let header = session_header(purpose, song_id, Local::now());
        let entry = format!("{header}\n{}\n{}\n", transcript.trim_end(), "=".repeat(HEADER_WIDTH));

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(entry.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;

        tracing::debug!(path = %path.display(), "conversation logged");
        Ok(())
    }

    pub fn log_info(&self, purpose: &str, song_id: Option<i64>) -> LogInfo {
        info_for(&self.log_path(purpose, song_id))
    }

    /// All log files in the directory, sorted by name.
    pub fn list_logs(&self) -> Result<Vec<LogInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut logs: Vec<LogInfo> = fs::read_dir(&self.dir)
            .with_context(|| format!("read {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_log_file(path))
            .map(|path| info_for(&path))
            .collect();
        logs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(logs)
    }

    pub fn read_log(&self, purpose: &str, song_id: Option<i64>) -> Result<Option<String>> {
        let path = self.log_path(purpose, song_id);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Remove log files last modified more than `days` ago.
    pub fn cleanup_older_than(&self, days: u64) -> Result<Vec<PathBuf>> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(days.saturating_mul(86_400)))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.cleanup_modified_before(cutoff)
    }

    fn cleanup_modified_before(&self, cutoff: SystemTime) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))? {
            let path = entry?.path();
            if !is_log_file(&path) {
                continue;
            }
            let modified = fs::metadata(&path).and_then(|meta| meta.modified());
            if matches!(modified, Ok(time) if time < cutoff) {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
                tracing::info!(path = %path.display(), "removed old conversation log");
                removed.push(path);
            }
        }
        removed.sort();
        Ok(removed)
    }
}

fn log_file_name(purpose: &str, song_id: Option<i64>) -> String {
    match song_id {
        Some(id) => format!("{purpose}_{id}.{LOG_EXTENSION}"),
        None => format!("{purpose}.{LOG_EXTENSION}"),
    }
}

fn is_log_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == LOG_EXTENSION)
}

/// `====== {timestamp} | {purpose} | song_id: {id} ======`, exactly
/// [`HEADER_WIDTH`] characters.
pub fn session_header(purpose: &str, song_id: Option<i64>, at: DateTime<Local>) -> String {
    let id = song_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let label = format!(" {} | {purpose} | song_id: {id} ", at.format("%Y-%m-%d %H:%M:%S"));
    let label: String = label.chars().take(HEADER_WIDTH).collect();

    let padding = HEADER_WIDTH - label.chars().count();
    let left = padding / 2;
    format!("{}{label}{}", "=".repeat(left), "=".repeat(padding - left))
}

fn is_session_header(line: &str) -> bool {
    line.starts_with('=') && line.contains(" | ") && line.contains("song_id:")
}

fn info_for(path: &Path) -> LogInfo {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    match fs::metadata(path) {
        Ok(meta) => {
            let sessions = fs::read_to_string(path)
                .map(|content| content.lines().filter(|line| is_session_header(line)).count())
                .unwrap_or_default();
            LogInfo {
                file_name,
                path: path.to_path_buf(),
                exists: true,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                sessions,
            }
        }
        Err(_) => LogInfo {
            file_name,
            path: path.to_path_buf(),
            exists: false,
            size_bytes: 0,
            modified: None,
            sessions: 0,
        },
    }
}
