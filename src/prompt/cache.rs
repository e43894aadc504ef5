use crate::error::PromptError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Prompt name → template text parsed from one YAML file.
pub type PromptTable = HashMap<String, String>;

#[derive(Debug, Clone)]
struct CachedFile {
    table: Option<Arc<PromptTable>>,
    modified: Option<SystemTime>,
}

/// Parsed prompt files keyed by path, reloaded when the file's modification
/// time changes. A missing file is cached as `None` until it appears.
#[derive(Debug, Default)]
pub struct PromptCache {
    files: HashMap<PathBuf, CachedFile>,
}

impl PromptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the table for `path`, re-reading it only if its modification
    /// time differs from the cached one.
    pub fn refresh_if_stale(&mut self, path: &Path) -> Result<Option<Arc<PromptTable>>, PromptError> {
        let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok();

        if let Some(cached) = self.files.get(path)
            && cached.modified == modified
        {
            return Ok(cached.table.clone());
        }

        let table = match modified {
            Some(_) => Some(Arc::new(load_table(path)?)),
            None => None,
        };
        if table.is_some() {
            tracing::debug!(path = %path.display(), "loaded prompt file");
        }

        self.files.insert(
            path.to_path_buf(),
            CachedFile {
                table: table.clone(),
                modified,
            },
        );
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn load_table(path: &Path) -> Result<PromptTable, PromptError> {
    let source_error = |message: String| PromptError::Source {
        path: path.display().to_string(),
        message,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| source_error(e.to_string()))?;
    if raw.trim().is_empty() {
        return Ok(PromptTable::new());
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|e| source_error(e.to_string()))?;
    let serde_yaml::Value::Mapping(mapping) = value else {
        return Err(source_error("top level must be a mapping".into()));
    };

    let mut table = PromptTable::new();
    for (key, value) in mapping {
        match (key, value) {
            (serde_yaml::Value::String(name), serde_yaml::Value::String(text)) => {
                table.insert(name, text);
            }
            (key, _) => {
                tracing::warn!(path = %path.display(), key = ?key, "skipping non-string prompt entry");
            }
        }
    }
    Ok(table)
}
