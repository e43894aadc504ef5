use super::builtin::builtin_prompt;
use super::cache::PromptCache;
use super::PromptSource;
use crate::error::PromptError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DEFAULTS_FILE: &str = "defaults.yaml";
const INTERNAL_FILE: &str = "internal.yaml";

/// Prompt files in one directory: `{model}.yaml`, then `defaults.yaml`,
/// then `internal.yaml`, then the built-in templates.
pub struct YamlPromptLibrary {
    dir: PathBuf,
    cache: Mutex<PromptCache>,
}

impl YamlPromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(PromptCache::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate_files(&self, model: Option<&str>) -> Vec<PathBuf> {
        let mut files = Vec::with_capacity(3);
        if let Some(model) = model.filter(|m| is_safe_file_stem(m)) {
            files.push(self.dir.join(format!("{model}.yaml")));
        }
        files.push(self.dir.join(DEFAULTS_FILE));
        files.push(self.dir.join(INTERNAL_FILE));
        files
    }
}

/// Model names become file names; reject anything that could escape the dir.
fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl PromptSource for YamlPromptLibrary {
    fn lookup(&self, name: &str, model: Option<&str>) -> Result<Option<String>, PromptError> {
        if name.is_empty() {
            return Ok(None);
        }

        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for path in self.candidate_files(model) {
            if let Some(table) = cache.refresh_if_stale(&path)?
                && let Some(text) = table.get(name)
            {
                tracing::debug!(prompt = name, file = %path.display(), "resolved prompt");
                return Ok(Some(text.clone()));
            }
        }

        Ok(builtin_prompt(name).map(str::to_string))
    }
}
